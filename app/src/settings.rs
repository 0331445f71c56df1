//! Compile-time configuration loaded via `toml-cfg`.

use std::time::Duration;

use clb_core::Policy;

#[toml_cfg::toml_config]
pub struct Settings {
    #[default("generic")]
    pub device_model: &'static str,
    /// Comma separated model names that always end the hardware call when a
    /// native cellular call goes off hook.
    #[default("Myco")]
    pub end_on_cellular_models: &'static str,
    #[default(false)]
    pub force_end_on_cellular: bool,
    #[default(400)]
    pub resume_delay_ms: u32,
    #[default(5000)]
    pub hangup_window_ms: u32,
    #[default(false)]
    pub correlate_outgoing: bool,
}

pub fn policy(settings: &Settings) -> Policy {
    Policy {
        resume_delay: Duration::from_millis(settings.resume_delay_ms.into()),
        hangup_window: Duration::from_millis(settings.hangup_window_ms.into()),
        end_on_cellular: settings.force_end_on_cellular
            || model_listed(settings.device_model, settings.end_on_cellular_models),
        correlate_outgoing: settings.correlate_outgoing,
    }
}

fn model_listed(model: &str, list: &str) -> bool {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| model.contains(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(model: &'static str, force: bool) -> Settings {
        Settings {
            device_model: model,
            end_on_cellular_models: "Myco, Rugged X",
            force_end_on_cellular: force,
            resume_delay_ms: 250,
            hangup_window_ms: 5000,
            correlate_outgoing: true,
        }
    }

    #[test]
    fn device_model_selects_cellular_policy() {
        assert!(policy(&settings("Myco 3", false)).end_on_cellular);
        assert!(policy(&settings("Rugged X2", false)).end_on_cellular);
        assert!(!policy(&settings("Pixel 8", false)).end_on_cellular);
        assert!(policy(&settings("Pixel 8", true)).end_on_cellular);
    }

    #[test]
    fn durations_are_converted() {
        let policy = policy(&settings("Pixel 8", false));
        assert_eq!(policy.resume_delay, Duration::from_millis(250));
        assert!(policy.correlate_outgoing);
    }

    #[test]
    fn empty_model_list_matches_nothing() {
        assert!(!model_listed("Myco 3", ""));
        assert!(!model_listed("Myco 3", " , "));
    }
}
