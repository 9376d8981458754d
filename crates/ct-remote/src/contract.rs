//! The configuration and metric contract of the traffic router.

use ct_types::{ParameterSchema, ParameterValue};

use crate::objective::{ObjectiveDirection, ScalarObjective, VectorObjective};

/// Every tunable router field, plus the two that stay fixed.
pub fn router_schema() -> ParameterSchema {
    ParameterSchema::new()
        .add_float("route_random_sigma", 0.0, 1.0)
        .add_float("exploration_percentage", 0.0, 1.0)
        .add_float("max_speed_and_length_factor", 0.0, 1.0)
        .add_float("average_edge_duration_factor", 0.0, 1.0)
        .add_float("freshness_update_factor", 0.0, 1.0)
        .add_float("freshness_cut_off_value", 0.0, 10_000.0)
        .add_int("re_route_every_ticks", 0, 60)
        .add_fixed("total_car_counter", ParameterValue::Int(750))
        .add_fixed("edge_average_influence", ParameterValue::Int(140))
}

/// Search only the routing noise; every other field, the car counter and
/// edge influence included, is pinned to zero.
pub fn router_sigma_schema() -> ParameterSchema {
    ParameterSchema::new()
        .add_float("route_random_sigma", 0.0, 0.3)
        .add_fixed("exploration_percentage", ParameterValue::Float(0.0))
        .add_fixed("max_speed_and_length_factor", ParameterValue::Float(0.0))
        .add_fixed("average_edge_duration_factor", ParameterValue::Float(0.0))
        .add_fixed("freshness_update_factor", ParameterValue::Float(0.0))
        .add_fixed("freshness_cut_off_value", ParameterValue::Float(0.0))
        .add_fixed("re_route_every_ticks", ParameterValue::Int(0))
        .add_fixed("total_car_counter", ParameterValue::Int(0))
        .add_fixed("edge_average_influence", ParameterValue::Int(0))
}

/// Combined trip overhead, routing cost and complaints, minimized.
pub fn router_cost_objective() -> ScalarObjective {
    ScalarObjective::new(ObjectiveDirection::Minimize)
        .add_term("car_stats.total_trip_overhead_average", 1.0)
        .add_term("car_stats.routing_duration", 1.0)
        .add_term("car_stats.total_complaints", 1.0)
}

pub fn travel_objectives() -> VectorObjective {
    VectorObjective::new(["averageTravelTime", "averageWaitingTime"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_schema_layout() {
        let schema = router_schema();
        schema.validate().unwrap();
        assert_eq!(schema.dim(), 7);
        assert_eq!(schema.parameters.len(), 9);

        let bounds = schema.bounds().unwrap();
        assert_eq!(bounds.ranges()[5], (0.0, 10_000.0));
        assert_eq!(bounds.ranges()[6], (0.0, 60.0));
    }

    #[test]
    fn router_configuration_has_every_field() {
        let schema = router_schema();
        let config = schema
            .configuration(&[0.1, 0.2, 0.3, 0.4, 0.5, 2500.0, 12.4])
            .unwrap();
        assert_eq!(config.len(), 9);
        assert_eq!(config["re_route_every_ticks"], ParameterValue::Int(12));
        assert_eq!(config["total_car_counter"], ParameterValue::Int(750));
        assert_eq!(config["edge_average_influence"], ParameterValue::Int(140));
        assert_eq!(config["freshness_cut_off_value"], ParameterValue::Float(2500.0));
    }

    #[test]
    fn sigma_schema_is_one_dimensional() {
        let schema = router_sigma_schema();
        schema.validate().unwrap();
        assert_eq!(schema.dim(), 1);
        let config = schema.configuration(&[0.25]).unwrap();
        assert_eq!(config["route_random_sigma"], ParameterValue::Float(0.25));
        assert_eq!(config["exploration_percentage"], ParameterValue::Float(0.0));
        assert_eq!(config["total_car_counter"], ParameterValue::Int(0));
        assert_eq!(config["edge_average_influence"], ParameterValue::Int(0));
        assert!(schema.configuration(&[0.5]).is_err());
    }

    #[test]
    fn default_objectives() {
        assert_eq!(router_cost_objective().terms.len(), 3);
        assert_eq!(router_cost_objective().direction, ObjectiveDirection::Minimize);
        assert_eq!(travel_objectives().len(), 2);
    }
}
