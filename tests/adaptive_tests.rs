//! Adaptive dispatcher verification tests
//!
//! Exercises the dispatch-table path end to end: selector key precedence,
//! derived keys, default fallback, argument and state errors, sticky build
//! failures and interaction with wrapper decoration.

use std::sync::Arc;

use extpoint::{
    Capability, Criteria, DispatcherParts, ExtensionInstance, ExtensionError, MethodDispatch,
    MethodSpec, Registry, WrapperSpec,
};

// ============================================================================
// Fixture: a transport capability with an adaptive `connect` method
// ============================================================================

trait Transport: ExtensionInstance {
    fn connect(&self, cx: Option<&Criteria>) -> Result<String, ExtensionError>;
    fn close(&self) -> Result<(), ExtensionError> {
        Ok(())
    }
}

struct Scheme(&'static str);
impl ExtensionInstance for Scheme {}
impl Transport for Scheme {
    fn connect(&self, _cx: Option<&Criteria>) -> Result<String, ExtensionError> {
        Ok(self.0.to_string())
    }
}

struct TransportCapability;
impl Capability for TransportCapability {
    type Instance = dyn Transport;
    const IDENT: &'static str = "transport";
    fn default_name() -> Option<&'static str> {
        Some("tcp")
    }
    fn methods() -> &'static [MethodSpec] {
        const METHODS: &[MethodSpec] = &[
            MethodSpec::adaptive("connect", &["transport", "kind"], 1),
            MethodSpec::plain("close"),
        ];
        METHODS
    }
}

/// The hand-written dispatcher an adaptive constructor produces: one
/// dispatch handle per selector-dependent method, errors for the rest.
struct TransportDispatcher {
    connect: MethodDispatch<TransportCapability>,
    parts: DispatcherParts<TransportCapability>,
}

impl ExtensionInstance for TransportDispatcher {}
impl Transport for TransportDispatcher {
    fn connect(&self, cx: Option<&Criteria>) -> Result<String, ExtensionError> {
        self.connect.select(cx)?.connect(cx)
    }
    fn close(&self) -> Result<(), ExtensionError> {
        Err(self.parts.unsupported("close"))
    }
}

fn transport_point(registry: &Arc<Registry>) -> Arc<extpoint::ExtensionPoint<TransportCapability>> {
    let point = registry.extension_point::<TransportCapability>().unwrap();
    point.register("tcp", || Ok(Box::new(Scheme("tcp")) as Box<dyn Transport>)).unwrap();
    point.register("udp", || Ok(Box::new(Scheme("udp")) as Box<dyn Transport>)).unwrap();
    point
        .register_adaptive(|parts| {
            let connect = parts.dispatch("connect")?;
            Ok(Box::new(TransportDispatcher { connect, parts }) as Box<dyn Transport>)
        })
        .unwrap();
    point
}

// ============================================================================
// 1. Selector extraction
// ============================================================================

mod selection_tests {
    use super::*;

    #[test]
    fn test_first_declared_key_wins() {
        let registry = Registry::new();
        let point = transport_point(&registry);
        let dispatcher = point.adaptive().unwrap();

        let cx = Criteria::new().with("kind", "udp").with("transport", "tcp");
        assert_eq!(dispatcher.connect(Some(&cx)).unwrap(), "tcp");
    }

    #[test]
    fn test_empty_value_falls_through_to_next_key() {
        let registry = Registry::new();
        let point = transport_point(&registry);
        let dispatcher = point.adaptive().unwrap();

        let cx = Criteria::new().with("transport", "").with("kind", "udp");
        assert_eq!(dispatcher.connect(Some(&cx)).unwrap(), "udp");
    }

    #[test]
    fn test_no_key_matches_falls_back_to_default_name() {
        let registry = Registry::new();
        let point = transport_point(&registry);
        let dispatcher = point.adaptive().unwrap();

        assert_eq!(dispatcher.connect(Some(&Criteria::new())).unwrap(), "tcp");
    }

    #[test]
    fn test_missing_criteria_is_an_argument_error() {
        let registry = Registry::new();
        let point = transport_point(&registry);
        let dispatcher = point.adaptive().unwrap();

        let err = dispatcher.connect(None).unwrap_err();
        assert!(matches!(err, ExtensionError::MissingCriteria { .. }));
        assert!(err.to_string().contains("connect"));
    }

    #[test]
    fn test_plain_method_reports_unsupported() {
        let registry = Registry::new();
        let point = transport_point(&registry);
        let dispatcher = point.adaptive().unwrap();

        let err = dispatcher.close().unwrap_err();
        assert!(matches!(err, ExtensionError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_selected_name_must_be_registered() {
        let registry = Registry::new();
        let point = transport_point(&registry);
        let dispatcher = point.adaptive().unwrap();

        let cx = Criteria::new().with("transport", "quic");
        assert!(matches!(
            dispatcher.connect(Some(&cx)).unwrap_err(),
            ExtensionError::NotFound { .. }
        ));
    }
}

// ============================================================================
// 2. Derived keys and selector-missing state errors
// ============================================================================

mod derived_key_tests {
    use super::*;

    struct ConnCapability;
    impl Capability for ConnCapability {
        type Instance = dyn Transport;
        const IDENT: &'static str = "conn";
        fn methods() -> &'static [MethodSpec] {
            // no keys declared: the capability identifier is the derived key
            const METHODS: &[MethodSpec] = &[MethodSpec::adaptive("connect", &[], 1)];
            METHODS
        }
    }

    struct ConnDispatcher {
        connect: MethodDispatch<ConnCapability>,
    }
    impl ExtensionInstance for ConnDispatcher {}
    impl Transport for ConnDispatcher {
        fn connect(&self, cx: Option<&Criteria>) -> Result<String, ExtensionError> {
            self.connect.select(cx)?.connect(cx)
        }
    }

    fn conn_point(registry: &Arc<Registry>) -> Arc<extpoint::ExtensionPoint<ConnCapability>> {
        let point = registry.extension_point::<ConnCapability>().unwrap();
        point.register("tcp", || Ok(Box::new(Scheme("tcp")) as Box<dyn Transport>)).unwrap();
        point
            .register_adaptive(|parts| {
                let connect = parts.dispatch("connect")?;
                Ok(Box::new(ConnDispatcher { connect }) as Box<dyn Transport>)
            })
            .unwrap();
        point
    }

    #[test]
    fn test_derived_key_is_the_capability_identifier() {
        let registry = Registry::new();
        let point = conn_point(&registry);
        let dispatcher = point.adaptive().unwrap();

        let cx = Criteria::new().with("conn", "tcp");
        assert_eq!(dispatcher.connect(Some(&cx)).unwrap(), "tcp");
    }

    #[test]
    fn test_no_selector_and_no_default_is_a_state_error() {
        let registry = Registry::new();
        let point = conn_point(&registry);
        let dispatcher = point.adaptive().unwrap();

        let err = dispatcher.connect(Some(&Criteria::new())).unwrap_err();
        match &err {
            ExtensionError::SelectorMissing { keys, .. } => {
                assert_eq!(keys, &vec!["conn".to_string()]);
            }
            other => panic!("expected SelectorMissing, got {other}"),
        }
    }
}

// ============================================================================
// 3. Build failures are sticky
// ============================================================================

mod sticky_failure_tests {
    use super::*;

    #[test]
    fn test_missing_adaptive_descriptor_is_sticky() {
        let registry = Registry::new();
        let point = registry.extension_point::<TransportCapability>().unwrap();
        point.register("tcp", || Ok(Box::new(Scheme("tcp")) as Box<dyn Transport>)).unwrap();

        let first = point.adaptive().err().unwrap();
        let second = point.adaptive().err().unwrap();
        assert!(matches!(first, ExtensionError::AdaptiveBuildFailure { .. }));
        assert_eq!(first.to_string(), second.to_string());
    }

    struct PlainOnlyCapability;
    impl Capability for PlainOnlyCapability {
        type Instance = dyn Transport;
        const IDENT: &'static str = "plainonly";
        fn methods() -> &'static [MethodSpec] {
            const METHODS: &[MethodSpec] = &[MethodSpec::plain("close")];
            METHODS
        }
    }

    #[test]
    fn test_table_without_adaptive_methods_fails_synthesis() {
        let registry = Registry::new();
        let point = registry.extension_point::<PlainOnlyCapability>().unwrap();
        point
            .register_adaptive(|parts| {
                let _connect = parts.dispatch("connect")?;
                Ok(Box::new(Scheme("unreachable")) as Box<dyn Transport>)
            })
            .unwrap();

        let err = point.adaptive().err().unwrap();
        assert!(matches!(err, ExtensionError::AdaptiveBuildFailure { .. }));
    }
}

// ============================================================================
// 4. Interaction with the rest of the pipeline
// ============================================================================

mod pipeline_tests {
    use super::*;

    #[test]
    fn test_adaptive_instance_is_built_once() {
        let registry = Registry::new();
        let point = transport_point(&registry);
        let a = point.adaptive().unwrap();
        let b = point.adaptive().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    struct Secured(Box<dyn Transport>);
    impl ExtensionInstance for Secured {}
    impl Transport for Secured {
        fn connect(&self, cx: Option<&Criteria>) -> Result<String, ExtensionError> {
            Ok(format!("{}+tls", self.0.connect(cx)?))
        }
    }

    #[test]
    fn test_selected_targets_are_wrapped() {
        let registry = Registry::new();
        let point = transport_point(&registry);
        point
            .register_wrapper(WrapperSpec::new(|inner| Ok(Box::new(Secured(inner)) as Box<dyn Transport>)))
            .unwrap();
        let dispatcher = point.adaptive().unwrap();

        let cx = Criteria::new().with("transport", "udp");
        assert_eq!(dispatcher.connect(Some(&cx)).unwrap(), "udp+tls");
    }

    #[test]
    fn test_dispatcher_outliving_its_point_reports_gone() {
        let dispatcher = {
            let registry = Registry::new();
            let point = transport_point(&registry);
            point.adaptive().unwrap()
        };
        // registry and point dropped; the weak back-reference is dead
        let cx = Criteria::new().with("transport", "tcp");
        assert!(matches!(
            dispatcher.connect(Some(&cx)).unwrap_err(),
            ExtensionError::RegistryGone { .. }
        ));
    }
}
