mod auth;
mod client;
mod model;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;

use super::select_primary;
use crate::config::{ConfigStore, HttpSettings, VaillantCredentials};
use crate::error::{ToolError, ToolResult};

pub use client::{MyVaillantCloud, MyVaillantSession};
pub use model::{render_status, HeatingSystem, HotWaterCircuit, Zone, NO_SPECIAL_FUNCTION};
#[cfg(test)]
pub(crate) use model::fixtures;

pub const DEFAULT_OVERRIDE_HOURS: f64 = 3.0;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Opens one authenticated session per tool call.
#[async_trait]
pub trait HeatingCloud: Send + Sync {
    async fn connect(
        &self,
        credentials: &VaillantCredentials,
        http: &HttpSettings,
    ) -> ToolResult<Box<dyn HeatingSession>>;
}

#[async_trait]
pub trait HeatingSession: Send + Sync {
    async fn systems(&self) -> ToolResult<Vec<HeatingSystem>>;

    async fn set_quick_veto(
        &self,
        system: &HeatingSystem,
        zone: &Zone,
        temperature: f64,
        duration_hours: f64,
    ) -> ToolResult<()>;

    async fn cancel_quick_veto(&self, system: &HeatingSystem, zone: &Zone) -> ToolResult<()>;

    async fn set_holiday(
        &self,
        system: &HeatingSystem,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ToolResult<()>;

    async fn cancel_holiday(&self, system: &HeatingSystem) -> ToolResult<()>;

    async fn boost_hot_water(
        &self,
        system: &HeatingSystem,
        circuit: &HotWaterCircuit,
    ) -> ToolResult<()>;

    async fn set_hot_water_temperature(
        &self,
        system: &HeatingSystem,
        circuit: &HotWaterCircuit,
        temperature: f64,
    ) -> ToolResult<()>;

    /// Releases the session. Called exactly once, whatever the operation's outcome.
    async fn close(&self);
}

pub fn parse_date(field: &str, value: &str) -> ToolResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        ToolError::invalid(
            field,
            format!("invalid {} '{}': expected YYYY-MM-DD", field, value),
        )
    })
}

pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeatingCommand {
    Status,
    SetQuickVeto {
        temperature: f64,
        duration_hours: f64,
    },
    CancelQuickVeto,
    SetHoliday {
        start: NaiveDate,
        end: NaiveDate,
    },
    CancelHoliday,
    BoostHotWater,
    SetHotWaterTemperature {
        temperature: f64,
    },
}

impl HeatingCommand {
    pub fn holiday(start_date: &str, end_date: &str) -> ToolResult<Self> {
        Ok(Self::SetHoliday {
            start: parse_date("start_date", start_date)?,
            end: parse_date("end_date", end_date)?,
        })
    }

    pub fn validate(&self) -> ToolResult<()> {
        match self {
            Self::SetQuickVeto {
                temperature,
                duration_hours,
            } => {
                if !temperature.is_finite() {
                    return Err(ToolError::invalid("temperature", "temperature must be a number"));
                }
                if !duration_hours.is_finite() || *duration_hours <= 0.0 {
                    return Err(ToolError::invalid(
                        "duration_hours",
                        "duration_hours must be greater than zero",
                    ));
                }
            }
            Self::SetHoliday { start, end } => {
                if end < start {
                    return Err(ToolError::invalid(
                        "end_date",
                        format!("end_date {} is before start_date {}", end, start),
                    ));
                }
            }
            Self::SetHotWaterTemperature { temperature } => {
                if !temperature.is_finite() {
                    return Err(ToolError::invalid("temperature", "temperature must be a number"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn apply(&self, session: &dyn HeatingSession) -> ToolResult<String> {
        let systems = session.systems().await?;
        let primary = || select_primary(&systems, "heating system");

        match self {
            Self::Status => Ok(render_status(&systems)),
            Self::SetQuickVeto {
                temperature,
                duration_hours,
            } => {
                let system = primary()?;
                let zone = select_primary(&system.zones, "heating zone")?;
                session
                    .set_quick_veto(system, zone, *temperature, *duration_hours)
                    .await?;
                Ok(format!(
                    "Quick veto set on zone {}: {:.1}°C for {} hours",
                    zone.name, temperature, duration_hours
                ))
            }
            Self::CancelQuickVeto => {
                let system = primary()?;
                let zone = select_primary(&system.zones, "heating zone")?;
                session.cancel_quick_veto(system, zone).await?;
                Ok(format!("Quick veto cancelled on zone {}", zone.name))
            }
            Self::SetHoliday { start, end } => {
                let system = primary()?;
                session
                    .set_holiday(system, utc_midnight(*start), utc_midnight(*end))
                    .await?;
                Ok(format!(
                    "Holiday mode set on {} from {} to {}",
                    system.name, start, end
                ))
            }
            Self::CancelHoliday => {
                let system = primary()?;
                session.cancel_holiday(system).await?;
                Ok(format!("Holiday mode cancelled on {}", system.name))
            }
            Self::BoostHotWater => {
                let system = primary()?;
                let circuit = select_primary(&system.hot_water, "hot water circuit")?;
                session.boost_hot_water(system, circuit).await?;
                Ok(format!("Hot water boost activated on {}", system.name))
            }
            Self::SetHotWaterTemperature { temperature } => {
                let system = primary()?;
                let circuit = select_primary(&system.hot_water, "hot water circuit")?;
                session
                    .set_hot_water_temperature(system, circuit, *temperature)
                    .await?;
                Ok(format!(
                    "Hot water target temperature set to {:.1}°C on {}",
                    temperature, system.name
                ))
            }
        }
    }
}

/// Owns a connected session until it is closed. A guard dropped before
/// [`SessionGuard::close`] ran hands the session to the runtime for release.
struct SessionGuard {
    session: Arc<dyn HeatingSession>,
    closed: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn HeatingSession>) -> Self {
        Self {
            session: Arc::from(session),
            closed: false,
        }
    }

    async fn close(mut self) {
        self.closed = true;
        self.session.close().await;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("heating call abandoned, releasing session in background");
                handle.spawn(async move { session.close().await });
            }
            Err(_) => tracing::warn!("no runtime to release abandoned heating session"),
        }
    }
}

fn not_configured() -> ToolError {
    ToolError::NotConfigured {
        integration: "Vaillant",
        fields: "email and password",
    }
}

pub struct VaillantAdapter {
    store: ConfigStore,
    cloud: Arc<dyn HeatingCloud>,
}

impl VaillantAdapter {
    pub fn new(store: ConfigStore) -> Self {
        Self::with_cloud(store, Arc::new(MyVaillantCloud::new()))
    }

    pub fn with_cloud(store: ConfigStore, cloud: Arc<dyn HeatingCloud>) -> Self {
        Self { store, cloud }
    }

    pub async fn execute(&self, command: HeatingCommand) -> ToolResult<String> {
        command.validate()?;

        let doc = self.store.load();
        let credentials = doc.vaillant_credentials().ok_or_else(not_configured)?;

        let guard = SessionGuard::new(self.cloud.connect(&credentials, &doc.http).await?);
        let outcome = command.apply(guard.session.as_ref()).await;
        guard.close().await;

        if let Err(e) = &outcome {
            tracing::debug!(?command, error = %e, "heating command failed");
        }
        outcome
    }

    pub async fn status(&self) -> ToolResult<String> {
        self.execute(HeatingCommand::Status).await
    }

    pub async fn set_temperature_override(
        &self,
        temperature: f64,
        duration_hours: Option<f64>,
    ) -> ToolResult<String> {
        self.execute(HeatingCommand::SetQuickVeto {
            temperature,
            duration_hours: duration_hours.unwrap_or(DEFAULT_OVERRIDE_HOURS),
        })
        .await
    }

    pub async fn cancel_temperature_override(&self) -> ToolResult<String> {
        self.execute(HeatingCommand::CancelQuickVeto).await
    }

    pub async fn set_holiday(&self, start_date: &str, end_date: &str) -> ToolResult<String> {
        self.execute(HeatingCommand::holiday(start_date, end_date)?)
            .await
    }

    pub async fn cancel_holiday(&self) -> ToolResult<String> {
        self.execute(HeatingCommand::CancelHoliday).await
    }

    pub async fn boost_hot_water(&self) -> ToolResult<String> {
        self.execute(HeatingCommand::BoostHotWater).await
    }

    pub async fn set_hot_water_temperature(&self, temperature: f64) -> ToolResult<String> {
        self.execute(HeatingCommand::SetHotWaterTemperature { temperature })
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeCloud;
    use super::model::fixtures::{cylinder, system, zone};
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    const CONFIGURED: &str = r#"{"vaillant": {"email": "me@example.com", "password": "secret"}}"#;

    fn adapter(config: &str, cloud: Arc<FakeCloud>) -> (TempDir, VaillantAdapter) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, config).unwrap();
        (dir, VaillantAdapter::with_cloud(ConfigStore::new(path), cloud))
    }

    fn household() -> Vec<HeatingSystem> {
        let mut second = zone("Upstairs", None);
        second.index = 1;
        let mut other = system(vec![zone("Annex", None)], vec![]);
        other.id = "sys-2".to_string();
        vec![system(vec![zone("Ground", None), second], vec![cylinder()]), other]
    }

    #[tokio::test]
    async fn unconfigured_makes_no_connection() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter("{}", cloud.clone());

        let results = [
            adapter.status().await,
            adapter.set_temperature_override(21.0, None).await,
            adapter.cancel_temperature_override().await,
            adapter.set_holiday("2026-12-20", "2027-01-03").await,
            adapter.cancel_holiday().await,
            adapter.boost_hot_water().await,
            adapter.set_hot_water_temperature(55.0).await,
        ];

        for result in results {
            let err = result.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotConfigured);
            assert!(err.render().starts_with("Error: Vaillant not configured"));
        }
        assert_eq!(cloud.connects(), 0);
    }

    #[tokio::test]
    async fn override_targets_first_zone_of_first_system() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let text = adapter.set_temperature_override(21.5, None).await.unwrap();

        assert_eq!(text, "Quick veto set on zone Ground: 21.5°C for 3 hours");
        assert_eq!(cloud.calls(), vec!["quick_veto sys-1 0 21.5 3"]);
        assert_eq!(cloud.closes(), 1);
    }

    #[tokio::test]
    async fn override_without_zones_fails_and_still_closes() {
        let cloud = Arc::new(FakeCloud::with_systems(vec![system(vec![], vec![])]));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let err = adapter.cancel_temperature_override().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.render(), "Error: no heating zone found");
        assert_eq!(cloud.connects(), 1);
        assert_eq!(cloud.closes(), 1);
    }

    #[tokio::test]
    async fn remote_failure_still_releases_session() {
        let cloud = Arc::new(FakeCloud {
            systems: household(),
            fail_writes: Some(ToolError::http(409, "conflict")),
            ..Default::default()
        });
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let err = adapter.boost_hot_water().await.unwrap_err();

        assert_eq!(err.render(), "Error 409: conflict");
        assert_eq!(cloud.closes(), 1);
    }

    #[tokio::test]
    async fn abandoned_call_still_releases_session() {
        let cloud = Arc::new(FakeCloud {
            systems: household(),
            stall: Some(std::time::Duration::from_secs(5)),
            ..Default::default()
        });
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(100), adapter.status()).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(cloud.connects(), 1);
        assert_eq!(cloud.closes(), 1);
    }

    #[tokio::test]
    async fn completed_call_closes_exactly_once() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        adapter.status().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(cloud.closes(), 1);
    }

    #[tokio::test]
    async fn holiday_dates_are_utc_midnight() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let text = adapter.set_holiday("2026-12-20", "2027-01-03").await.unwrap();

        assert_eq!(text, "Holiday mode set on Home from 2026-12-20 to 2027-01-03");
        assert_eq!(
            cloud.calls(),
            vec!["holiday sys-1 2026-12-20T00:00:00+00:00 2027-01-03T00:00:00+00:00"]
        );
    }

    #[tokio::test]
    async fn malformed_holiday_date_names_field_before_connecting() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let err = adapter.set_holiday("2026-12-20", "03/01/2027").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.render().contains("end_date"));

        let err = adapter.set_holiday("soon", "2027-01-03").await.unwrap_err();
        assert!(err.render().contains("start_date"));

        let err = adapter.set_holiday("2027-01-03", "2026-12-20").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { ref field, .. } if field == "end_date"));

        assert_eq!(cloud.connects(), 0);
    }

    #[tokio::test]
    async fn hot_water_needs_a_circuit() {
        let cloud = Arc::new(FakeCloud::with_systems(vec![system(vec![zone("Ground", None)], vec![])]));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let err = adapter.set_hot_water_temperature(52.0).await.unwrap_err();
        assert_eq!(err.render(), "Error: no hot water circuit found");
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn hot_water_temperature_goes_to_first_circuit() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let text = adapter.set_hot_water_temperature(52.0).await.unwrap();
        assert_eq!(text, "Hot water target temperature set to 52.0°C on Home");
        assert_eq!(cloud.calls(), vec!["dhw_temperature sys-1 255 52"]);
    }

    #[tokio::test]
    async fn holiday_cancel_and_boost_use_first_system() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        adapter.cancel_holiday().await.unwrap();
        adapter.boost_hot_water().await.unwrap();

        assert_eq!(cloud.calls(), vec!["cancel_holiday sys-1", "boost sys-1 255"]);
        assert_eq!(cloud.connects(), 2);
        assert_eq!(cloud.closes(), 2);
    }

    #[tokio::test]
    async fn status_without_systems_is_not_an_error() {
        let cloud = Arc::new(FakeCloud::default());
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        assert_eq!(adapter.status().await.unwrap(), "No heating systems found");
        assert_eq!(cloud.closes(), 1);
    }

    #[tokio::test]
    async fn writes_without_systems_report_missing() {
        let cloud = Arc::new(FakeCloud::default());
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let err = adapter.cancel_holiday().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.render(), "Error: no heating system found");
        assert!(cloud.calls().is_empty());
        assert_eq!(cloud.closes(), 1);
    }

    #[tokio::test]
    async fn status_lists_every_system() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter(CONFIGURED, cloud);

        let text = adapter.status().await.unwrap();
        assert!(text.contains("Zone Ground"));
        assert!(text.contains("Zone Upstairs"));
        assert!(text.contains("Zone Annex"));
    }

    #[tokio::test]
    async fn non_positive_duration_is_rejected() {
        let cloud = Arc::new(FakeCloud::with_systems(household()));
        let (_dir, adapter) = adapter(CONFIGURED, cloud.clone());

        let err = adapter.set_temperature_override(20.0, Some(0.0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(cloud.connects(), 0);
    }
}
