// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, validation errors, env-backed secrets, and destination merging.

use fleetflip::config::*;
use fleetflip::error::Error;
use fleetflip::fleet::Capacity;
use fleetflip::lifecycle::LifecycleResult;
use fleetflip::types::Color;
use std::path::PathBuf;
use std::time::Duration;

const MINIMAL: &str = r#"
service: shop
fleets:
  blue: { desired: 2, min: 1, max: 4 }
  green: { desired: 0, min: 0, max: 0 }
target_groups:
  - role: web
"#;

fn with(extra: &str) -> String {
    format!("{MINIMAL}{extra}")
}

fn invalid(yaml: &str) -> String {
    match Config::from_yaml(yaml) {
        Err(Error::InvalidConfig(message)) => message,
        Err(other) => panic!("expected invalid config, got {other}"),
        Ok(_) => panic!("expected invalid config"),
    }
}

mod parsing {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.service.as_str(), "shop");
        assert_eq!(config.initial_active, Color::Blue);
        assert!(config.instance_protection);
        assert_eq!(config.lifecycle.heartbeat_timeout, Duration::from_secs(300));
        assert_eq!(config.lifecycle.default_result, LifecycleResult::Abandon);
        assert_eq!(config.convergence.poll_interval, Duration::from_secs(10));
        assert_eq!(config.convergence.timeout, Duration::from_secs(600));
        assert!(matches!(config.backend, BackendConfig::Memory));
        assert!(config.listener_override.is_none());

        let specs = config.target_group_specs();
        assert_eq!(specs.len(), 1);
        assert!(!specs[0].is_scoped());
        assert_eq!(specs[0].health_check.path, "/");
    }

    #[test]
    fn full_config() {
        let yaml = with(
            r#"
  - role: api
    paths: ["/api/*"]
    hosts: ["api.example.com"]
    priority: 5
    health_check:
      path: /healthz
      interval: 10s
      timeout: 2s
      matcher: "200-299"
initial_active: blue
standby_capacity: { desired: 1, min: 1, max: 2 }
lifecycle:
  heartbeat_timeout: 2m
  default_result: continue
convergence:
  poll_interval: 5s
  timeout: 15m
drain:
  wait: 90s
stabilization: 1m
instance_protection: false
listener_override:
  fixed_response:
    status_code: 503
    body: down for maintenance
backend:
  kind: http
  endpoint: controller.internal:8080
  request_timeout: 20s
"#,
        );
        let config = Config::from_yaml(&yaml).unwrap();

        assert_eq!(config.target_groups.len(), 2);
        let api = &config.target_group_specs()[1];
        assert!(api.is_scoped());
        assert_eq!(api.priority, Some(5));
        assert_eq!(api.health_check.interval, Duration::from_secs(10));
        assert_eq!(api.health_check.matcher, "200-299");

        assert_eq!(config.standby_capacity, Some(Capacity::new(1, 1, 2).unwrap()));
        assert_eq!(config.lifecycle.default_result, LifecycleResult::Continue);
        assert_eq!(config.drain.wait, Duration::from_secs(90));
        assert_eq!(config.stabilization, Duration::from_secs(60));
        assert!(!config.instance_protection);
        assert!(matches!(
            config.listener_override,
            Some(ListenerOverride::FixedResponse(_))
        ));
        match config.backend {
            BackendConfig::Http {
                endpoint,
                request_timeout,
                auth_token,
            } => {
                assert_eq!(endpoint, "controller.internal:8080");
                assert_eq!(request_timeout, Duration::from_secs(20));
                assert!(auth_token.is_none());
            }
            BackendConfig::Memory => panic!("expected http backend"),
        }
    }

    #[test]
    fn listener_override_redirect_is_a_plain_map() {
        let yaml = with(
            "listener_override:\n  redirect:\n    status_code: 301\n    protocol: HTTPS\n    port: 443\n",
        );
        let config = Config::from_yaml(&yaml).unwrap();
        let Some(ListenerOverride::Redirect(redirect)) = config.listener_override else {
            panic!("expected a redirect override");
        };
        assert_eq!(redirect.status_code, 301);
        assert_eq!(redirect.protocol.as_deref(), Some("HTTPS"));
        assert_eq!(redirect.port, Some(443));
    }

    #[test]
    fn empty_target_groups_fail_to_parse() {
        let yaml = r#"
service: shop
fleets:
  blue: { desired: 2, min: 1, max: 4 }
  green: { desired: 0, min: 0, max: 0 }
target_groups: []
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("at least one target group"));
    }
}

mod validation {
    use super::*;

    #[test]
    fn exactly_one_catch_all_group() {
        let yaml = with("  - role: other\n");
        assert!(invalid(&yaml).contains("exactly one target group"));
    }

    #[test]
    fn duplicate_roles_and_priorities() {
        let yaml = with("  - role: web\n    paths: [\"/x\"]\n");
        assert!(invalid(&yaml).contains("duplicate target group role"));

        let yaml = with(
            "  - role: a\n    paths: [\"/a\"]\n    priority: 3\n  - role: b\n    paths: [\"/b\"]\n    priority: 3\n",
        );
        assert!(invalid(&yaml).contains("duplicate rule priority 3"));
    }

    #[test]
    fn initial_active_needs_capacity() {
        let yaml = MINIMAL.replace("service: shop", "service: shop\ninitial_active: green");
        assert!(invalid(&yaml).contains("initial active fleet 'green'"));
    }

    #[test]
    fn capacity_bounds_are_checked() {
        let yaml = MINIMAL.replace(
            "blue: { desired: 2, min: 1, max: 4 }",
            "blue: { desired: 5, min: 1, max: 4 }",
        );
        assert!(invalid(&yaml).contains("fleets.blue"));

        let yaml = with("standby_capacity: { desired: 0, min: 0, max: 2 }\n");
        assert!(invalid(&yaml).contains("standby_capacity"));
    }

    #[test]
    fn health_check_timeout_must_be_below_interval() {
        let yaml = MINIMAL.replace(
            "  - role: web\n",
            "  - role: web\n    health_check:\n      interval: 5s\n      timeout: 5s\n",
        );
        assert!(invalid(&yaml).contains("web"));
    }

    #[test]
    fn listener_override_is_validated() {
        let yaml = with("listener_override:\n  fixed_response:\n    status_code: 99\n");
        assert!(invalid(&yaml).contains("listener_override"));

        let yaml = with("listener_override:\n  redirect:\n    status_code: 302\n");
        assert!(invalid(&yaml).contains("listener_override"));
    }
}

mod standby_capacity {
    use super::*;

    #[test]
    fn falls_back_to_active_bounds() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        let active = Capacity::new(3, 2, 6).unwrap();
        assert_eq!(config.standby_capacity_for(Color::Green, active), active);
    }

    #[test]
    fn configured_fleet_wins_over_active() {
        let yaml = MINIMAL.replace(
            "green: { desired: 0, min: 0, max: 0 }",
            "green: { desired: 1, min: 1, max: 3 }",
        );
        let config = Config::from_yaml(&yaml).unwrap();
        let active = Capacity::new(3, 2, 6).unwrap();
        assert_eq!(
            config.standby_capacity_for(Color::Green, active),
            Capacity::new(1, 1, 3).unwrap()
        );
    }

    #[test]
    fn explicit_standby_capacity_wins() {
        let config = Config::from_yaml(&with("standby_capacity: { desired: 2, min: 2, max: 2 }\n"))
            .unwrap();
        assert_eq!(
            config.standby_capacity_for(Color::Green, Capacity::new(5, 1, 9).unwrap()),
            Capacity::new(2, 2, 2).unwrap()
        );
    }
}

mod env_values {
    use super::*;

    #[test]
    fn auth_token_resolves_from_environment() {
        let yaml = with("backend:\n  kind: http\n  endpoint: localhost:9000\n  auth_token:\n    env: FLEETFLIP_TEST_TOKEN\n");
        let config = Config::from_yaml(&yaml).unwrap();
        let BackendConfig::Http { auth_token, .. } = config.backend else {
            panic!("expected http backend");
        };
        let token = auth_token.unwrap();

        temp_env::with_var("FLEETFLIP_TEST_TOKEN", Some("s3cret"), || {
            assert_eq!(token.resolve().unwrap(), "s3cret");
        });
        temp_env::with_var_unset("FLEETFLIP_TEST_TOKEN", || {
            assert!(matches!(token.resolve(), Err(Error::MissingEnvVar(_))));
        });
    }

    #[test]
    fn env_default_is_used_when_unset() {
        let value = EnvValue::FromEnv {
            var: "FLEETFLIP_TEST_UNSET".to_string(),
            default: Some("fallback".to_string()),
        };
        temp_env::with_var_unset("FLEETFLIP_TEST_UNSET", || {
            assert_eq!(value.resolve().unwrap(), "fallback");
        });
    }

    #[test]
    fn state_dir_env_overrides_config() {
        let config = Config::from_yaml(&with("state_dir: /var/lib/fleetflip\n")).unwrap();
        temp_env::with_var(STATE_DIR_ENV, Some("/tmp/ff-state"), || {
            assert_eq!(config.state_dir(), PathBuf::from("/tmp/ff-state"));
        });
        temp_env::with_var_unset(STATE_DIR_ENV, || {
            assert_eq!(config.state_dir(), PathBuf::from("/var/lib/fleetflip"));
        });
    }
}

mod destinations {
    use super::*;

    const WITH_DESTINATIONS: &str = r#"
destinations:
  staging:
    state_dir: /tmp/staging
    fleets:
      blue: { desired: 1, min: 1, max: 1 }
      green: { desired: 0, min: 0, max: 0 }
    instance_protection: false
  broken:
    fleets:
      blue: { desired: 0, min: 0, max: 0 }
      green: { desired: 0, min: 0, max: 0 }
"#;

    #[test]
    fn destination_overrides_are_merged() {
        let config = Config::from_yaml(&with(WITH_DESTINATIONS)).unwrap();
        let staging = config.for_destination("staging").unwrap();

        assert_eq!(staging.fleets.blue, Capacity::new(1, 1, 1).unwrap());
        assert_eq!(staging.state_dir, Some(PathBuf::from("/tmp/staging")));
        assert!(!staging.instance_protection);
        assert_eq!(staging.service, config.service);
    }

    #[test]
    fn unknown_destination_is_an_error() {
        let config = Config::from_yaml(&with(WITH_DESTINATIONS)).unwrap();
        assert!(matches!(
            config.for_destination("prod"),
            Err(Error::UnknownDestination(name)) if name == "prod"
        ));
    }

    #[test]
    fn merged_config_is_revalidated() {
        let config = Config::from_yaml(&with(WITH_DESTINATIONS)).unwrap();
        assert!(matches!(
            config.for_destination("broken"),
            Err(Error::InvalidConfig(_))
        ));
    }
}

mod init {
    use super::*;

    #[test]
    fn template_round_trips_through_the_parser() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("checkout"), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "checkout");
        assert_eq!(config.target_groups.len(), 2);
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), None, false).unwrap();
        assert!(matches!(
            init_config(dir.path(), None, false),
            Err(Error::AlreadyExists(_))
        ));
        init_config(dir.path(), None, true).unwrap();
    }

    #[test]
    fn discover_reports_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }
}
