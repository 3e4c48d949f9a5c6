use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

use super::auth::{self, IDENTITY_BASE};
use super::model::{HeatingSystem, HotWaterCircuit, Zone};
use super::{HeatingCloud, HeatingSession};
use crate::config::{HttpSettings, VaillantCredentials};
use crate::error::{ToolError, ToolResult};

pub const API_BASE: &str =
    "https://api.vaillant-group.com/service-connected-control/end-user-app-api/v1";
const BOOST_FUNCTION: &str = "CYLINDER_BOOST";

/// The myVAILLANT cloud. Each `connect` performs a fresh login.
#[derive(Debug, Clone)]
pub struct MyVaillantCloud {
    api_base: String,
    identity_base: String,
}

impl MyVaillantCloud {
    pub fn new() -> Self {
        Self::with_endpoints(API_BASE, IDENTITY_BASE)
    }

    pub fn with_endpoints(api_base: impl Into<String>, identity_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            identity_base: identity_base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for MyVaillantCloud {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HeatingCloud for MyVaillantCloud {
    async fn connect(
        &self,
        credentials: &VaillantCredentials,
        http: &HttpSettings,
    ) -> ToolResult<Box<dyn HeatingSession>> {
        let client = Client::builder()
            .timeout(http.timeout())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ToolError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let token = auth::login(&client, &self.identity_base, credentials).await?;
        let logout = token
            .refresh_token
            .map(|refresh| (auth::realm_url(&self.identity_base, credentials), refresh));

        Ok(Box::new(MyVaillantSession {
            client,
            api_base: self.api_base.clone(),
            access_token: token.access_token,
            logout,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MyVaillantSession {
    client: Client,
    api_base: String,
    access_token: String,
    logout: Option<(String, String)>,
    closed: AtomicBool,
}

impl MyVaillantSession {
    pub fn with_token(client: Client, api_base: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            logout: None,
            closed: AtomicBool::new(false),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn control_url(&self, system: &HeatingSystem, path: &str) -> String {
        self.url(&format!(
            "/systems/{}/tli{}",
            urlencoding::encode(&system.id),
            path
        ))
    }

    async fn send(&self, request: RequestBuilder) -> ToolResult<reqwest::Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .header("x-app-identifier", "VAILLANT")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::http(status, body));
        }
        Ok(response)
    }

    async fn system(&self, home: &Home) -> ToolResult<HeatingSystem> {
        let url = self.url(&format!("/systems/{}/tli", urlencoding::encode(&home.system_id)));
        let control: SystemControl = self.send(self.client.get(url)).await?.json().await?;
        Ok(control.into_system(home))
    }
}

#[async_trait]
impl HeatingSession for MyVaillantSession {
    async fn systems(&self) -> ToolResult<Vec<HeatingSystem>> {
        let homes: Vec<Home> = self
            .send(self.client.get(self.url("/homes")))
            .await?
            .json()
            .await?;

        let mut systems = Vec::with_capacity(homes.len());
        for home in &homes {
            systems.push(self.system(home).await?);
        }
        Ok(systems)
    }

    async fn set_quick_veto(
        &self,
        system: &HeatingSystem,
        zone: &Zone,
        temperature: f64,
        duration_hours: f64,
    ) -> ToolResult<()> {
        let url = self.control_url(system, &format!("/zones/{}/quick-veto", zone.index));
        self.send(self.client.post(url).json(&json!({
            "desiredRoomTemperatureSetpoint": temperature,
            "duration": duration_hours,
        })))
        .await?;
        Ok(())
    }

    async fn cancel_quick_veto(&self, system: &HeatingSystem, zone: &Zone) -> ToolResult<()> {
        let url = self.control_url(system, &format!("/zones/{}/quick-veto", zone.index));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn set_holiday(
        &self,
        system: &HeatingSystem,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ToolResult<()> {
        let url = self.control_url(system, "/away-mode");
        self.send(self.client.post(url).json(&json!({
            "startDateTime": start.to_rfc3339_opts(SecondsFormat::Secs, true),
            "endDateTime": end.to_rfc3339_opts(SecondsFormat::Secs, true),
        })))
        .await?;
        Ok(())
    }

    async fn cancel_holiday(&self, system: &HeatingSystem) -> ToolResult<()> {
        let url = self.control_url(system, "/away-mode");
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn boost_hot_water(
        &self,
        system: &HeatingSystem,
        circuit: &HotWaterCircuit,
    ) -> ToolResult<()> {
        let url = self.control_url(
            system,
            &format!("/domestic-hot-water/{}/boost", circuit.index),
        );
        self.send(self.client.post(url).json(&json!({}))).await?;
        Ok(())
    }

    async fn set_hot_water_temperature(
        &self,
        system: &HeatingSystem,
        circuit: &HotWaterCircuit,
        temperature: f64,
    ) -> ToolResult<()> {
        let url = self.control_url(
            system,
            &format!("/domestic-hot-water/{}/temperature", circuit.index),
        );
        self.send(self.client.patch(url).json(&json!({ "setpoint": temperature })))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some((realm_url, refresh_token)) = &self.logout {
            if let Err(e) = auth::logout(&self.client, realm_url, refresh_token).await {
                tracing::debug!(error = %e, "myVAILLANT logout failed");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Home {
    system_id: String,
    home_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemControl {
    #[serde(default)]
    state: ControlState,
    #[serde(default)]
    configuration: ControlConfiguration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlState {
    #[serde(default)]
    system: SystemState,
    #[serde(default)]
    zones: Vec<ZoneState>,
    #[serde(default)]
    domestic_hot_water: Vec<HotWaterState>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemState {
    outdoor_temperature: Option<f64>,
    system_water_pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneState {
    index: u32,
    current_room_temperature: Option<f64>,
    desired_room_temperature_setpoint: Option<f64>,
    current_special_function: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotWaterState {
    index: u32,
    current_domestic_hot_water_temperature: Option<f64>,
    current_special_function: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlConfiguration {
    #[serde(default)]
    zones: Vec<ZoneConfiguration>,
    #[serde(default)]
    domestic_hot_water: Vec<HotWaterConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneConfiguration {
    index: u32,
    general: Option<ZoneGeneral>,
    heating: Option<ZoneHeating>,
}

#[derive(Debug, Deserialize)]
struct ZoneGeneral {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneHeating {
    operation_mode_heating: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotWaterConfiguration {
    index: u32,
    operation_mode_domestic_hot_water: Option<String>,
    tapping_setpoint: Option<f64>,
}

impl SystemControl {
    fn into_system(self, home: &Home) -> HeatingSystem {
        let configuration = self.configuration;

        let zones = self
            .state
            .zones
            .into_iter()
            .map(|state| {
                let config = configuration.zones.iter().find(|z| z.index == state.index);
                Zone {
                    index: state.index,
                    name: config
                        .and_then(|c| c.general.as_ref())
                        .and_then(|g| g.name.clone())
                        .unwrap_or_else(|| format!("Zone {}", state.index)),
                    current_temperature: state.current_room_temperature,
                    target_temperature: state.desired_room_temperature_setpoint,
                    heating_mode: config
                        .and_then(|c| c.heating.as_ref())
                        .and_then(|h| h.operation_mode_heating.clone())
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                    special_function: state.current_special_function,
                }
            })
            .collect();

        let hot_water = self
            .state
            .domestic_hot_water
            .into_iter()
            .map(|state| {
                let config = configuration
                    .domestic_hot_water
                    .iter()
                    .find(|d| d.index == state.index);
                HotWaterCircuit {
                    index: state.index,
                    current_temperature: state.current_domestic_hot_water_temperature,
                    target_temperature: config.and_then(|c| c.tapping_setpoint),
                    mode: config
                        .and_then(|c| c.operation_mode_domestic_hot_water.clone())
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                    boost: state.current_special_function.as_deref() == Some(BOOST_FUNCTION),
                }
            })
            .collect();

        HeatingSystem {
            id: home.system_id.clone(),
            name: home
                .home_name
                .clone()
                .unwrap_or_else(|| home.system_id.clone()),
            water_pressure: self.state.system.system_water_pressure,
            outdoor_temperature: self.state.system.outdoor_temperature,
            zones,
            hot_water,
        }
    }
}
