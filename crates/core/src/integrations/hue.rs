use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ConfigStore, HttpSettings, HueCredentials};
use crate::error::{ToolError, ToolResult};

const APP_KEY_HEADER: &str = "hue-application-key";
const LIGHTS_PATH: &str = "/clip/v2/resource/light";
const SCENES_PATH: &str = "/clip/v2/resource/scene";

pub const BRIGHTNESS_RANGE: (i64, i64) = (0, 100);
pub const MIREK_RANGE: (i64, i64) = (153, 500);

pub fn clamp_brightness(brightness: i64) -> i64 {
    brightness.clamp(BRIGHTNESS_RANGE.0, BRIGHTNESS_RANGE.1)
}

pub fn clamp_color_temp(mirek: i64) -> i64 {
    mirek.clamp(MIREK_RANGE.0, MIREK_RANGE.1)
}

fn not_configured() -> ToolError {
    ToolError::NotConfigured {
        integration: "Hue",
        fields: "bridge_ip and app_key",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightUpdate {
    pub on: Option<bool>,
    pub brightness: Option<i64>,
    pub color_temp: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct LightBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    on: Option<OnBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimming: Option<DimmingBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_temperature: Option<ColorTemperatureBody>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct OnBody {
    on: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct DimmingBody {
    brightness: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ColorTemperatureBody {
    mirek: i64,
}

impl LightUpdate {
    pub fn is_empty(&self) -> bool {
        self.on.is_none() && self.brightness.is_none() && self.color_temp.is_none()
    }

    fn body(&self) -> Option<LightBody> {
        if self.is_empty() {
            return None;
        }
        Some(LightBody {
            on: self.on.map(|on| OnBody { on }),
            dimming: self.brightness.map(|b| DimmingBody {
                brightness: clamp_brightness(b),
            }),
            color_temperature: self.color_temp.map(|c| ColorTemperatureBody {
                mirek: clamp_color_temp(c),
            }),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OnState {
    #[serde(default)]
    on: bool,
}

#[derive(Debug, Deserialize)]
struct Dimming {
    #[serde(default)]
    brightness: f64,
}

#[derive(Debug, Deserialize)]
struct Light {
    id: Option<String>,
    metadata: Option<Metadata>,
    on: Option<OnState>,
    dimming: Option<Dimming>,
}

#[derive(Debug, Deserialize)]
struct Scene {
    id: Option<String>,
    metadata: Option<Metadata>,
}

fn display_name(metadata: &Option<Metadata>) -> &str {
    metadata
        .as_ref()
        .and_then(|m| m.name.as_deref())
        .unwrap_or("Unknown")
}

impl Light {
    fn render(&self) -> String {
        let is_on = self.on.as_ref().is_some_and(|s| s.on);
        let brightness = self.dimming.as_ref().map(|d| d.brightness).unwrap_or(0.0);
        format!(
            "- {} (id: {}) — {}, brightness: {}%",
            display_name(&self.metadata),
            self.id.as_deref().unwrap_or("?"),
            if is_on { "ON" } else { "OFF" },
            brightness
        )
    }
}

impl Scene {
    fn render(&self) -> String {
        format!(
            "- {} (id: {})",
            display_name(&self.metadata),
            self.id.as_deref().unwrap_or("?")
        )
    }
}

/// CLIP v2 client for a single bridge.
pub struct HueBridge {
    client: Client,
    base_url: String,
    app_key: String,
}

impl HueBridge {
    pub fn connect(credentials: &HueCredentials, http: &HttpSettings) -> ToolResult<Self> {
        if credentials.accept_invalid_certs {
            tracing::warn!(
                bridge = %credentials.bridge_ip,
                "accepting invalid TLS certificates for the Hue bridge (hue.accept_invalid_certs)"
            );
        }

        let client = Client::builder()
            .timeout(http.timeout())
            .danger_accept_invalid_certs(credentials.accept_invalid_certs)
            .build()
            .map_err(|e| ToolError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(
            client,
            credentials.base_url(),
            credentials.app_key.clone(),
        ))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_key: app_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_collection<T: serde::de::DeserializeOwned>(&self, path: &str) -> ToolResult<Vec<T>> {
        let response = self
            .client
            .get(self.url(path))
            .header(APP_KEY_HEADER, &self.app_key)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::http(status, body));
        }

        let collection: Collection<T> = response.json().await?;
        Ok(collection.data)
    }

    async fn put(&self, path: &str, body: &impl Serialize) -> ToolResult<()> {
        let response = self
            .client
            .put(self.url(path))
            .header(APP_KEY_HEADER, &self.app_key)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::http(status, body));
        }
        Ok(())
    }

    pub async fn list_lights(&self) -> ToolResult<String> {
        let lights: Vec<Light> = self.get_collection(LIGHTS_PATH).await?;
        if lights.is_empty() {
            return Ok("No lights found".to_string());
        }
        Ok(lights.iter().map(Light::render).collect::<Vec<_>>().join("\n"))
    }

    pub async fn set_light(&self, light_id: &str, update: &LightUpdate) -> ToolResult<String> {
        let body = update.body().ok_or_else(|| {
            ToolError::invalid("on", "Specify at least one of: on, brightness, color_temp")
        })?;

        let path = format!("{}/{}", LIGHTS_PATH, urlencoding::encode(light_id));
        self.put(&path, &body).await?;

        let echoed = serde_json::to_string(&body)
            .map_err(|e| ToolError::Transport(format!("failed to encode body: {}", e)))?;
        Ok(format!("Light {} updated: {}", light_id, echoed))
    }

    pub async fn list_scenes(&self) -> ToolResult<String> {
        let scenes: Vec<Scene> = self.get_collection(SCENES_PATH).await?;
        if scenes.is_empty() {
            return Ok("No scenes found".to_string());
        }
        Ok(scenes.iter().map(Scene::render).collect::<Vec<_>>().join("\n"))
    }

    pub async fn activate_scene(&self, scene_id: &str) -> ToolResult<String> {
        let path = format!("{}/{}", SCENES_PATH, urlencoding::encode(scene_id));
        self.put(&path, &json!({ "recall": { "action": "active" } }))
            .await?;
        Ok(format!("Scene {} activated", scene_id))
    }
}

/// Resolves bridge credentials on every call, then delegates to [`HueBridge`].
#[derive(Debug, Clone)]
pub struct HueAdapter {
    store: ConfigStore,
}

impl HueAdapter {
    pub fn new(store: ConfigStore) -> Self {
        Self { store }
    }

    fn bridge(&self) -> ToolResult<HueBridge> {
        let doc = self.store.load();
        let credentials = doc.hue_credentials().ok_or_else(not_configured)?;
        HueBridge::connect(&credentials, &doc.http)
    }

    pub async fn list_lights(&self) -> ToolResult<String> {
        self.bridge()?.list_lights().await
    }

    pub async fn set_light(&self, light_id: &str, update: &LightUpdate) -> ToolResult<String> {
        self.bridge()?.set_light(light_id, update).await
    }

    pub async fn list_scenes(&self) -> ToolResult<String> {
        self.bridge()?.list_scenes().await
    }

    pub async fn activate_scene(&self, scene_id: &str) -> ToolResult<String> {
        self.bridge()?.activate_scene(scene_id).await
    }
}
