//! Configuration documents and descriptors loaded from text.

use std::time::Duration;

use hydration_core::{
    BoundaryDescriptor, ConfigPatch, InteractionEvent, ReadinessTimeout, SchedulerConfig,
    SchedulerError, Trigger,
};

#[test]
fn config_deserializes_from_toml_with_defaults() {
    let config: SchedulerConfig = toml::from_str(
        r#"
        max_concurrent = 2
        default_readiness_timeout_ms = 1500
        "#,
    )
    .unwrap();

    assert_eq!(config.max_concurrent, 2);
    assert_eq!(config.readiness_timeout(), Duration::from_millis(1500));
    assert_eq!(config.execution_timeout(), Duration::from_millis(5000));
    assert_eq!(config.completed_retention, 64);
    config.validate().unwrap();
}

#[test]
fn zero_concurrency_from_toml_fails_validation() {
    let config: SchedulerConfig = toml::from_str("max_concurrent = 0").unwrap();
    assert!(matches!(
        config.validate(),
        Err(SchedulerError::InvalidConfig(_))
    ));
}

#[test]
fn patch_deserializes_partially() {
    let patch: ConfigPatch = toml::from_str("default_execution_timeout_ms = 800").unwrap();
    assert_eq!(patch, ConfigPatch::default().execution_timeout(Duration::from_millis(800)));

    let mut config = SchedulerConfig::default();
    config.apply(&patch).unwrap();
    assert_eq!(config.default_execution_timeout_ms, 800);
    assert_eq!(config.max_concurrent, 3);
}

#[test]
fn descriptors_load_from_a_page_manifest() {
    #[derive(serde::Deserialize)]
    struct Manifest {
        boundary: Vec<BoundaryDescriptor>,
    }

    let manifest: Manifest = toml::from_str(
        r##"
        [[boundary]]
        id = "hero"
        priority = 1
        trigger = { kind = "immediate" }

        [[boundary]]
        id = "comments"
        priority = 4
        anchor = "#comments"
        trigger = { kind = "visible", threshold = 0.5, root_margin = "200px" }
        readiness_timeout = { after_ms = 3000 }

        [[boundary]]
        id = "search"
        trigger = { kind = "interaction", events = ["focus", "keydown"] }
        execution_timeout_ms = 800

        [[boundary]]
        id = "footer"
        priority = 5
        trigger = { kind = "idle" }
        readiness_timeout = "never"
        "##,
    )
    .unwrap();

    let [hero, comments, search, footer] = <[BoundaryDescriptor; 4]>::try_from(manifest.boundary)
        .ok()
        .unwrap();

    assert_eq!(hero.priority, 1);
    assert_eq!(hero.trigger, Trigger::Immediate);

    assert_eq!(comments.anchor_or_id(), "#comments");
    match &comments.trigger {
        Trigger::Visible { options } => {
            assert_eq!(options.threshold, 0.5);
            assert_eq!(options.root_margin, "200px");
        }
        other => panic!("unexpected trigger {other:?}"),
    }
    assert_eq!(comments.readiness_timeout, ReadinessTimeout::AfterMs(3000));

    assert_eq!(search.priority, 3);
    assert_eq!(
        search.trigger,
        Trigger::interaction_on([InteractionEvent::Focus, InteractionEvent::KeyDown])
    );
    assert_eq!(search.execution_timeout(), Some(Duration::from_millis(800)));

    assert_eq!(footer.trigger, Trigger::idle());
    assert_eq!(footer.readiness_timeout, ReadinessTimeout::Never);
    for descriptor in [&hero, &comments, &search, &footer] {
        descriptor.validate().unwrap();
    }
}
