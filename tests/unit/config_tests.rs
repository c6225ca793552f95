use resequencer::resequencer::config::{DEFAULT_CAPACITY, DEFAULT_DELIVERY_ATTEMPT_INTERVAL};
use resequencer::{ConfigError, ResequencerConfig};
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResequencerConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(2000));
        assert!(!config.reject_old);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(
            config.delivery_attempt_interval(),
            DEFAULT_DELIVERY_ATTEMPT_INTERVAL
        );
        assert!(!config.ignore_invalid);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ResequencerConfig::from_json("{}").unwrap();
        assert_eq!(config, ResequencerConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = ResequencerConfig::from_json(
            r#"{ "timeout_ms": 250, "capacity": 16, "ignore_invalid": true }"#,
        )
        .unwrap();

        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.capacity, 16);
        assert!(config.ignore_invalid);
        assert!(!config.reject_old);
    }

    #[test]
    fn test_malformed_document() {
        let result = ResequencerConfig::from_json(r#"{ "timeout_ms": "soon" }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_values_rejected() {
        let result = ResequencerConfig::from_json(r#"{ "timeout_ms": 0 }"#);
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "timeout_ms",
                ..
            })
        ));

        let config = ResequencerConfig::default().with_capacity(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "capacity",
                ..
            })
        ));

        let config =
            ResequencerConfig::default().with_delivery_attempt_interval(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for delivery_attempt_interval_ms: must be greater than zero"
        );
    }

    #[test]
    fn test_builder() {
        let config = ResequencerConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_reject_old(true)
            .with_capacity(64)
            .with_delivery_attempt_interval(Duration::from_millis(10))
            .with_ignore_invalid(true);

        assert_eq!(config.timeout_ms, 5000);
        assert!(config.reject_old);
        assert_eq!(config.capacity, 64);
        assert_eq!(config.delivery_attempt_interval_ms, 10);
        assert!(config.ignore_invalid);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(ResequencerConfig::default()).unwrap();
        assert_eq!(json["timeout_ms"], 2000);
        assert_eq!(json["capacity"], 1000);
        assert_eq!(json["delivery_attempt_interval_ms"], 1000);
        assert_eq!(json["reject_old"], false);
    }
}
