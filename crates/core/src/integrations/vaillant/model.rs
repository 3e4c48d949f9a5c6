use serde::Serialize;

pub const NO_SPECIAL_FUNCTION: &str = "NONE";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatingSystem {
    pub id: String,
    pub name: String,
    pub water_pressure: Option<f64>,
    pub outdoor_temperature: Option<f64>,
    pub zones: Vec<Zone>,
    pub hot_water: Vec<HotWaterCircuit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub index: u32,
    pub name: String,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub heating_mode: String,
    pub special_function: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotWaterCircuit {
    pub index: u32,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub mode: String,
    pub boost: bool,
}

impl Zone {
    pub fn active_special_function(&self) -> Option<&str> {
        self.special_function
            .as_deref()
            .filter(|f| !f.is_empty() && *f != NO_SPECIAL_FUNCTION)
    }

    /// The special function while one is active, otherwise the base heating mode.
    pub fn resolved_mode(&self) -> &str {
        self.active_special_function()
            .unwrap_or(self.heating_mode.as_str())
    }
}

impl HeatingSystem {
    /// First zone carrying a special function decides the holiday line.
    pub fn holiday_mode(&self) -> &str {
        self.zones
            .iter()
            .find_map(Zone::active_special_function)
            .unwrap_or("off")
    }
}

fn temperature(value: Option<f64>) -> String {
    match value {
        Some(t) => format!("{:.1}°C", t),
        None => "n/a".to_string(),
    }
}

pub fn render_status(systems: &[HeatingSystem]) -> String {
    if systems.is_empty() {
        return "No heating systems found".to_string();
    }

    let mut output = String::new();
    for (i, system) in systems.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        output.push_str(&format!("System: {}\n", system.name));
        output.push_str(&format!(
            "  Water pressure: {}\n",
            system
                .water_pressure
                .map(|p| format!("{:.1} bar", p))
                .unwrap_or_else(|| "n/a".to_string())
        ));
        output.push_str(&format!(
            "  Outdoor temperature: {}\n",
            temperature(system.outdoor_temperature)
        ));
        output.push_str(&format!("  Holiday mode: {}\n", system.holiday_mode()));

        for zone in &system.zones {
            output.push_str(&format!(
                "  Zone {}: {} (target {}), mode {}\n",
                zone.name,
                temperature(zone.current_temperature),
                temperature(zone.target_temperature),
                zone.resolved_mode()
            ));
        }

        for circuit in &system.hot_water {
            output.push_str(&format!(
                "  Hot water: {} (target {}), mode {}, boost {}\n",
                temperature(circuit.current_temperature),
                temperature(circuit.target_temperature),
                circuit.mode,
                if circuit.boost { "on" } else { "off" }
            ));
        }
    }

    output.trim_end().to_string()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn holiday_off_without_special_functions() {
        let sys = system(
            vec![zone("Ground", Some("NONE")), zone("Upstairs", None)],
            vec![],
        );
        assert_eq!(sys.holiday_mode(), "off");
        assert!(render_status(&[sys]).contains("Holiday mode: off"));
    }

    #[test]
    fn holiday_reports_first_special_function() {
        let sys = system(
            vec![
                zone("Ground", Some("NONE")),
                zone("Upstairs", Some("HOLIDAY")),
                zone("Attic", Some("QUICK_VETO")),
            ],
            vec![],
        );
        assert_eq!(sys.holiday_mode(), "HOLIDAY");
    }

    #[test]
    fn zone_mode_prefers_active_special_function() {
        assert_eq!(zone("a", Some("QUICK_VETO")).resolved_mode(), "QUICK_VETO");
        assert_eq!(zone("a", Some("NONE")).resolved_mode(), "TIME_CONTROLLED");
        assert_eq!(zone("a", None).resolved_mode(), "TIME_CONTROLLED");
    }

    #[test]
    fn status_renders_zones_and_hot_water() {
        let mut dhw = cylinder();
        dhw.boost = true;
        let text = render_status(&[system(vec![zone("Living", None)], vec![dhw])]);

        assert_eq!(
            text,
            "System: Home\n  Water pressure: 1.8 bar\n  Outdoor temperature: 7.3°C\n  Holiday mode: off\n  Zone Living: 20.5°C (target 21.0°C), mode TIME_CONTROLLED\n  Hot water: 48.0°C (target 50.0°C), mode TIME_CONTROLLED, boost on"
        );
    }

    #[test]
    fn no_systems_is_informational() {
        assert_eq!(render_status(&[]), "No heating systems found");
    }
}
