//! Resources an event manager rule can act on, and the methods each resource
//! API exposes.

use crate::types::MachineConfig;
use serde::Serialize;

/// Every resource API accepts arbitrary commands through this method.
pub const DO_COMMAND: &str = "do_command";

// Sorted method names per API, not including `do_command`.
const RESOURCE_METHODS: &[(&str, &[&str])] = &[
    (
        "rdk:component:arm",
        &[
            "get_end_position",
            "get_geometries",
            "get_joint_positions",
            "get_kinematics",
            "is_moving",
            "move_to_joint_positions",
            "move_to_position",
            "stop",
        ],
    ),
    (
        "rdk:component:base",
        &[
            "get_geometries",
            "get_properties",
            "is_moving",
            "move_straight",
            "set_power",
            "set_velocity",
            "spin",
            "stop",
        ],
    ),
    (
        "rdk:component:board",
        &[
            "analog_by_name",
            "digital_interrupt_by_name",
            "get_geometries",
            "gpio_pin_by_name",
            "set_power_mode",
            "stream_digital_interrupt_ticks",
        ],
    ),
    (
        "rdk:component:camera",
        &[
            "get_geometries",
            "get_image",
            "get_images",
            "get_point_cloud",
            "get_properties",
        ],
    ),
    (
        "rdk:component:gantry",
        &[
            "get_geometries",
            "get_kinematics",
            "get_lengths",
            "get_position",
            "home",
            "is_moving",
            "move_to_position",
            "stop",
        ],
    ),
    (
        "rdk:component:gripper",
        &["get_geometries", "grab", "is_moving", "open", "stop"],
    ),
    (
        "rdk:component:motor",
        &[
            "get_geometries",
            "get_position",
            "get_properties",
            "go_for",
            "go_to",
            "is_moving",
            "is_powered",
            "reset_zero_position",
            "set_power",
            "set_rpm",
            "stop",
        ],
    ),
    (
        "rdk:component:sensor",
        &["get_geometries", "get_readings"],
    ),
    (
        "rdk:component:servo",
        &["get_geometries", "get_position", "is_moving", "move", "stop"],
    ),
    (
        "rdk:service:vision",
        &[
            "capture_all_from_camera",
            "get_classifications",
            "get_classifications_from_camera",
            "get_detections",
            "get_detections_from_camera",
            "get_object_point_clouds",
            "get_properties",
        ],
    ),
    (
        "rdk:service:slam",
        &[
            "get_internal_state",
            "get_point_cloud_map",
            "get_position",
            "get_properties",
        ],
    ),
    (
        "rdk:service:motion",
        &[
            "get_plan",
            "get_pose",
            "list_plan_statuses",
            "move",
            "move_on_globe",
            "move_on_map",
            "stop_plan",
        ],
    ),
];

/// Public methods of a resource API, sorted, always including `do_command`.
///
/// Returns `None` for APIs without a known method table.
pub fn methods_for(api: &str) -> Option<Vec<&'static str>> {
    RESOURCE_METHODS
        .iter()
        .find(|(known, _)| *known == api)
        .map(|(_, methods)| {
            let mut methods = methods.to_vec();
            methods.push(DO_COMMAND);
            methods.sort_unstable();
            methods
        })
}

/// Every API with a known method table.
pub fn known_apis() -> impl Iterator<Item = &'static str> {
    RESOURCE_METHODS.iter().map(|(api, _)| *api)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub name: String,
    pub api: String,
    /// Empty when the API has no known method table.
    pub methods: Vec<&'static str>,
}

/// Components and services configured on a machine, in document order.
///
/// Event managers are skipped since rules do not target them. Entries are
/// only included when they carry string `name` and `api` fields.
pub fn resources(config: &MachineConfig) -> Vec<Resource> {
    let components = config
        .components
        .iter()
        .filter(|c| !c.is_event_manager())
        .filter_map(|c| Some((c.name.as_str(), c.api()?)));

    let services = config.services.iter().flatten().filter_map(|s| {
        Some((s.get("name")?.as_str()?, s.get("api")?.as_str()?))
    });

    components
        .chain(services)
        .map(|(name, api)| Resource {
            name: name.to_string(),
            api: api.to_string(),
            methods: methods_for(api).unwrap_or_default(),
        })
        .collect()
}
