//! Key expressions used by the bridge.
//!
//! ```text
//! {prefix}/{light}/state          light state (published)
//! {prefix}/{light}/set            ON/OFF commands (subscribed)
//! {prefix}/@/status               bridge status (published)
//! {prefix}/@/commands             JSON light commands (subscribed)
//! {prefix}/@/commands/result      command outcomes (published)
//! ```
//!
//! The `@` segment marks administrative channels and never collides with a
//! light name.

pub fn state_key(prefix: &str, light: &str) -> String {
    format!("{}/{}/state", prefix, light)
}

pub fn set_key(prefix: &str, light: &str) -> String {
    format!("{}/{}/set", prefix, light)
}

/// Wildcard matching the set key of every light.
pub fn set_wildcard(prefix: &str) -> String {
    format!("{}/*/set", prefix)
}

pub fn status_key(prefix: &str) -> String {
    format!("{}/@/status", prefix)
}

pub fn command_key(prefix: &str) -> String {
    format!("{}/@/commands", prefix)
}

pub fn command_result_key(prefix: &str) -> String {
    format!("{}/@/commands/result", prefix)
}

/// Extract the light name from a `{prefix}/{light}/set` key.
pub fn light_from_set_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let light = key
        .strip_prefix(prefix)?
        .strip_prefix('/')?
        .strip_suffix("/set")?;

    if light.is_empty() || light.contains('/') || light == "@" {
        None
    } else {
        Some(light)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "zensight/modbus_light";

    #[test]
    fn test_keys() {
        assert_eq!(state_key(PREFIX, "hall"), "zensight/modbus_light/hall/state");
        assert_eq!(set_key(PREFIX, "hall"), "zensight/modbus_light/hall/set");
        assert_eq!(set_wildcard(PREFIX), "zensight/modbus_light/*/set");
        assert_eq!(status_key(PREFIX), "zensight/modbus_light/@/status");
        assert_eq!(command_key(PREFIX), "zensight/modbus_light/@/commands");
        assert_eq!(
            command_result_key(PREFIX),
            "zensight/modbus_light/@/commands/result"
        );
    }

    #[test]
    fn test_light_from_set_key() {
        assert_eq!(light_from_set_key(PREFIX, &set_key(PREFIX, "hall")), Some("hall"));
        assert_eq!(light_from_set_key(PREFIX, "zensight/modbus_light/hall/state"), None);
        assert_eq!(light_from_set_key(PREFIX, "zensight/modbus_light/a/b/set"), None);
        assert_eq!(light_from_set_key(PREFIX, "zensight/modbus_light/@/set"), None);
        assert_eq!(light_from_set_key(PREFIX, "other/hall/set"), None);
    }
}
