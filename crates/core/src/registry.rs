use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ConfigStore;
use crate::error::{ToolError, ToolResult};
use crate::integrations::{HueAdapter, LightUpdate, MacOsAdapter, VaillantAdapter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    OpenUrlScheme,
    OpenApplication,
    RunShortcut,
    ListShortcuts,
    HueListLights,
    HueSetLight,
    HueListScenes,
    HueActivateScene,
    VaillantStatus,
    VaillantSetTemperature,
    VaillantCancelTemperatureOverride,
    VaillantSetHoliday,
    VaillantCancelHoliday,
    VaillantBoostHotWater,
    VaillantSetHotWaterTemperature,
}

impl Tool {
    pub const ALL: [Tool; 15] = [
        Tool::OpenUrlScheme,
        Tool::OpenApplication,
        Tool::RunShortcut,
        Tool::ListShortcuts,
        Tool::HueListLights,
        Tool::HueSetLight,
        Tool::HueListScenes,
        Tool::HueActivateScene,
        Tool::VaillantStatus,
        Tool::VaillantSetTemperature,
        Tool::VaillantCancelTemperatureOverride,
        Tool::VaillantSetHoliday,
        Tool::VaillantCancelHoliday,
        Tool::VaillantBoostHotWater,
        Tool::VaillantSetHotWaterTemperature,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::OpenUrlScheme => "open_url_scheme",
            Tool::OpenApplication => "open_application",
            Tool::RunShortcut => "run_shortcut",
            Tool::ListShortcuts => "list_shortcuts",
            Tool::HueListLights => "hue_list_lights",
            Tool::HueSetLight => "hue_set_light",
            Tool::HueListScenes => "hue_list_scenes",
            Tool::HueActivateScene => "hue_activate_scene",
            Tool::VaillantStatus => "vaillant_status",
            Tool::VaillantSetTemperature => "vaillant_set_temperature",
            Tool::VaillantCancelTemperatureOverride => "vaillant_cancel_temperature_override",
            Tool::VaillantSetHoliday => "vaillant_set_holiday",
            Tool::VaillantCancelHoliday => "vaillant_cancel_holiday",
            Tool::VaillantBoostHotWater => "vaillant_boost_hot_water",
            Tool::VaillantSetHotWaterTemperature => "vaillant_set_hot_water_temperature",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, input_schema) = match self {
            Tool::OpenUrlScheme => (
                "Open a macOS URL scheme. Works with any registered URL scheme on the host Mac, e.g. neewerlite://toggleLight or shortcuts://run-shortcut?name=MyShortcut",
                json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "The URL to open" }
                    },
                    "required": ["url"]
                }),
            ),
            Tool::OpenApplication => (
                "Open a macOS application by name, e.g. Safari, Finder, Terminal",
                json!({
                    "type": "object",
                    "properties": {
                        "app_name": { "type": "string", "description": "Application name" }
                    },
                    "required": ["app_name"]
                }),
            ),
            Tool::RunShortcut => (
                "Run a macOS Shortcut by name",
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "The name of the Shortcut to run" },
                        "input_text": { "type": "string", "description": "Optional text input passed to the Shortcut" }
                    },
                    "required": ["name"]
                }),
            ),
            Tool::ListShortcuts => ("List all available macOS Shortcuts", no_arguments()),
            Tool::HueListLights => (
                "List all Philips Hue lights and their current state",
                no_arguments(),
            ),
            Tool::HueSetLight => (
                "Control a Philips Hue light",
                json!({
                    "type": "object",
                    "properties": {
                        "light_id": { "type": "string", "description": "The Hue light ID (from hue_list_lights)" },
                        "on": { "type": "boolean", "description": "Turn the light on (true) or off (false)" },
                        "brightness": { "type": "integer", "minimum": 0, "maximum": 100, "description": "Brightness 0-100" },
                        "color_temp": { "type": "integer", "minimum": 153, "maximum": 500, "description": "Color temperature in mirek (153=cool daylight, 500=warm candlelight)" }
                    },
                    "required": ["light_id"]
                }),
            ),
            Tool::HueListScenes => ("List all available Philips Hue scenes", no_arguments()),
            Tool::HueActivateScene => (
                "Activate a Philips Hue scene",
                json!({
                    "type": "object",
                    "properties": {
                        "scene_id": { "type": "string", "description": "The scene ID (from hue_list_scenes)" }
                    },
                    "required": ["scene_id"]
                }),
            ),
            Tool::VaillantStatus => (
                "Show heating status: zones, temperatures, modes, hot water and holiday mode",
                no_arguments(),
            ),
            Tool::VaillantSetTemperature => (
                "Temporarily override the room temperature of the first heating zone (quick veto)",
                json!({
                    "type": "object",
                    "properties": {
                        "temperature": { "type": "number", "description": "Target room temperature in °C" },
                        "duration_hours": { "type": "number", "description": "Override duration in hours (default 3)" }
                    },
                    "required": ["temperature"]
                }),
            ),
            Tool::VaillantCancelTemperatureOverride => (
                "Cancel the temperature override on the first heating zone",
                no_arguments(),
            ),
            Tool::VaillantSetHoliday => (
                "Put the heating system into holiday mode between two dates",
                json!({
                    "type": "object",
                    "properties": {
                        "start_date": { "type": "string", "description": "First day of the holiday (YYYY-MM-DD)" },
                        "end_date": { "type": "string", "description": "Last day of the holiday (YYYY-MM-DD)" }
                    },
                    "required": ["start_date", "end_date"]
                }),
            ),
            Tool::VaillantCancelHoliday => ("Cancel holiday mode", no_arguments()),
            Tool::VaillantBoostHotWater => (
                "Start a one-off hot water boost",
                no_arguments(),
            ),
            Tool::VaillantSetHotWaterTemperature => (
                "Set the hot water target temperature",
                json!({
                    "type": "object",
                    "properties": {
                        "temperature": { "type": "number", "description": "Target hot water temperature in °C" }
                    },
                    "required": ["temperature"]
                }),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

fn no_arguments() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn list_tools() -> Vec<ToolDefinition> {
    Tool::ALL.iter().map(Tool::definition).collect()
}

#[derive(Debug, Deserialize)]
struct UrlArgs {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationArgs {
    app_name: String,
}

#[derive(Debug, Deserialize)]
struct ShortcutArgs {
    name: String,
    input_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetLightArgs {
    light_id: String,
    on: Option<bool>,
    brightness: Option<i64>,
    color_temp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SceneArgs {
    scene_id: String,
}

#[derive(Debug, Deserialize)]
struct TemperatureOverrideArgs {
    temperature: f64,
    duration_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HolidayArgs {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct TemperatureArgs {
    temperature: f64,
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> ToolResult<T> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::invalid("arguments", format!("invalid arguments: {}", e)))
}

/// Maps tool names to adapter operations and flattens every outcome into text.
pub struct Dispatcher {
    macos: MacOsAdapter,
    hue: HueAdapter,
    vaillant: VaillantAdapter,
}

impl Dispatcher {
    pub fn new(store: ConfigStore) -> Self {
        Self::with_adapters(
            MacOsAdapter::new(),
            HueAdapter::new(store.clone()),
            VaillantAdapter::new(store),
        )
    }

    pub fn with_adapters(macos: MacOsAdapter, hue: HueAdapter, vaillant: VaillantAdapter) -> Self {
        Self {
            macos,
            hue,
            vaillant,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        list_tools()
    }

    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<String, DispatchError> {
        let tool = Tool::from_name(name).ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;

        tracing::debug!(tool = name, "dispatching tool call");

        match self.invoke(tool, arguments).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::debug!(tool = name, kind = ?e.kind(), error = %e, "tool call failed");
                Ok(e.render())
            }
        }
    }

    async fn invoke(&self, tool: Tool, arguments: Value) -> ToolResult<String> {
        match tool {
            Tool::OpenUrlScheme => {
                let args: UrlArgs = parse_args(arguments)?;
                self.macos.open_url_scheme(&args.url).await
            }
            Tool::OpenApplication => {
                let args: ApplicationArgs = parse_args(arguments)?;
                self.macos.open_application(&args.app_name).await
            }
            Tool::RunShortcut => {
                let args: ShortcutArgs = parse_args(arguments)?;
                self.macos
                    .run_shortcut(&args.name, args.input_text.as_deref())
                    .await
            }
            Tool::ListShortcuts => self.macos.list_shortcuts().await,
            Tool::HueListLights => self.hue.list_lights().await,
            Tool::HueSetLight => {
                let args: SetLightArgs = parse_args(arguments)?;
                let update = LightUpdate {
                    on: args.on,
                    brightness: args.brightness,
                    color_temp: args.color_temp,
                };
                self.hue.set_light(&args.light_id, &update).await
            }
            Tool::HueListScenes => self.hue.list_scenes().await,
            Tool::HueActivateScene => {
                let args: SceneArgs = parse_args(arguments)?;
                self.hue.activate_scene(&args.scene_id).await
            }
            Tool::VaillantStatus => self.vaillant.status().await,
            Tool::VaillantSetTemperature => {
                let args: TemperatureOverrideArgs = parse_args(arguments)?;
                self.vaillant
                    .set_temperature_override(args.temperature, args.duration_hours)
                    .await
            }
            Tool::VaillantCancelTemperatureOverride => {
                self.vaillant.cancel_temperature_override().await
            }
            Tool::VaillantSetHoliday => {
                let args: HolidayArgs = parse_args(arguments)?;
                self.vaillant
                    .set_holiday(&args.start_date, &args.end_date)
                    .await
            }
            Tool::VaillantCancelHoliday => self.vaillant.cancel_holiday().await,
            Tool::VaillantBoostHotWater => self.vaillant.boost_hot_water().await,
            Tool::VaillantSetHotWaterTemperature => {
                let args: TemperatureArgs = parse_args(arguments)?;
                self.vaillant
                    .set_hot_water_temperature(args.temperature)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::vaillant::fake::FakeCloud;
    use crate::integrations::vaillant::fixtures::{cylinder, system, zone};
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn dispatcher(config: &str) -> (TempDir, Dispatcher, Arc<FakeCloud>) {
        dispatcher_with(config, FakeCloud::default())
    }

    fn dispatcher_with(config: &str, cloud: FakeCloud) -> (TempDir, Dispatcher, Arc<FakeCloud>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, config).unwrap();
        let store = ConfigStore::new(path);
        let cloud = Arc::new(cloud);
        let dispatcher = Dispatcher::with_adapters(
            MacOsAdapter::with_commands(vec!["true".to_string()], vec!["false".to_string()]),
            HueAdapter::new(store.clone()),
            VaillantAdapter::with_cloud(store, cloud.clone()),
        );
        (dir, dispatcher, cloud)
    }

    #[test]
    fn registry_publishes_fifteen_unique_tools() {
        let tools = list_tools();
        assert_eq!(tools.len(), 15);

        let names: HashSet<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), 15);
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
    }

    #[test]
    fn schemas_declare_required_arguments() {
        let set_light = Tool::HueSetLight.definition();
        assert_eq!(set_light.input_schema["required"], json!(["light_id"]));

        let holiday = Tool::VaillantSetHoliday.definition();
        assert_eq!(
            holiday.input_schema["required"],
            json!(["start_date", "end_date"])
        );

        let serialized = serde_json::to_value(Tool::HueListLights.definition()).unwrap();
        assert!(serialized["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn unknown_tool_is_a_protocol_error() {
        let (_dir, dispatcher, _) = dispatcher("{}");
        let err = dispatcher.dispatch("make_coffee", json!({})).await.unwrap_err();
        assert_eq!(err, DispatchError::UnknownTool("make_coffee".to_string()));
    }

    #[tokio::test]
    async fn missing_argument_is_reported_as_text() {
        let (_dir, dispatcher, cloud) = dispatcher("{}");

        let text = dispatcher
            .dispatch("vaillant_set_temperature", json!({}))
            .await
            .unwrap();
        assert!(text.starts_with("Error: invalid arguments: missing field `temperature`"));

        let text = dispatcher
            .dispatch("hue_set_light", json!({ "light_id": "x", "brightness": "bright" }))
            .await
            .unwrap();
        assert!(text.starts_with("Error: invalid arguments"));
        assert_eq!(cloud.connects(), 0);
    }

    #[tokio::test]
    async fn empty_config_reports_not_configured() {
        let (_dir, dispatcher, cloud) = dispatcher("{}");

        for (tool, args) in [
            ("hue_list_lights", Value::Null),
            ("hue_set_light", json!({ "light_id": "a", "on": true })),
            ("hue_list_scenes", Value::Null),
            ("hue_activate_scene", json!({ "scene_id": "s" })),
        ] {
            let text = dispatcher.dispatch(tool, args).await.unwrap();
            assert_eq!(
                text,
                "Error: Hue not configured. Set bridge_ip and app_key in config.json"
            );
        }

        for (tool, args) in [
            ("vaillant_status", Value::Null),
            ("vaillant_set_temperature", json!({ "temperature": 21 })),
            ("vaillant_cancel_temperature_override", Value::Null),
            (
                "vaillant_set_holiday",
                json!({ "start_date": "2026-12-20", "end_date": "2027-01-03" }),
            ),
            ("vaillant_cancel_holiday", Value::Null),
            ("vaillant_boost_hot_water", Value::Null),
            ("vaillant_set_hot_water_temperature", json!({ "temperature": 50 })),
        ] {
            let text = dispatcher.dispatch(tool, args).await.unwrap();
            assert_eq!(
                text,
                "Error: Vaillant not configured. Set email and password in config.json"
            );
        }

        assert_eq!(cloud.connects(), 0);
    }

    #[tokio::test]
    async fn vaillant_override_defaults_to_three_hours() {
        let household = vec![system(vec![zone("Living", None)], vec![cylinder()])];
        let (_dir, dispatcher, cloud) = dispatcher_with(
            r#"{"vaillant": {"email": "me@example.com", "password": "secret"}}"#,
            FakeCloud::with_systems(household),
        );

        let text = dispatcher
            .dispatch("vaillant_set_temperature", json!({ "temperature": 19 }))
            .await
            .unwrap();

        assert_eq!(text, "Quick veto set on zone Living: 19.0°C for 3 hours");
        assert_eq!(cloud.calls(), vec!["quick_veto sys-1 0 19 3"]);
        assert_eq!(cloud.closes(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn macos_tools_flatten_to_text() {
        let (_dir, dispatcher, _) = dispatcher("{}");

        let text = dispatcher
            .dispatch("open_url_scheme", json!({ "url": "neewerlite://turnOnLight" }))
            .await
            .unwrap();
        assert_eq!(text, "Opened: neewerlite://turnOnLight");

        let text = dispatcher.dispatch("list_shortcuts", json!({})).await.unwrap();
        assert_eq!(text, "Error: exited with status 1");
    }
}
