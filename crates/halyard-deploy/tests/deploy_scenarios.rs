//! End-to-end deployment scenarios against the in-memory model.
//!
//! The progress transcripts asserted here are part of the external
//! contract: same bundle, same lines, in the same order.

mod common;

use std::collections::BTreeMap;

use common::FakeModel;
use halyard_bundle::BundleData;
use halyard_deploy::{deploy_bundle, DeployError, DeployResult, RecordingProgress};

async fn deploy_yaml(model: &FakeModel, yaml: &str) -> (Vec<String>, DeployResult<()>) {
    let data = BundleData::from_yaml(yaml).expect("bundle YAML");
    let progress = RecordingProgress::default();
    let result = deploy_bundle(&data, model, model, &progress).await;
    (progress.lines(), result)
}

fn unit_map(model: &FakeModel) -> BTreeMap<String, String> {
    model.unit_machines()
}

const WORDPRESS_SIMPLE: &str = r#"
services:
    mysql:
        charm: cs:trusty/mysql-42
        num_units: 1
    wordpress:
        charm: cs:trusty/wordpress-47
        num_units: 1
relations:
    - ["wordpress:db", "mysql:server"]
"#;

fn wordpress_simple_model() -> FakeModel {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/mysql-42");
    model.upload_charm("cs:trusty/wordpress-47");
    model
}

#[tokio::test]
async fn wordpress_simple_first_deploy() {
    let model = wordpress_simple_model();
    let (lines, result) = deploy_yaml(&model, WORDPRESS_SIMPLE).await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/mysql-42",
            "service mysql deployed (charm: cs:trusty/mysql-42)",
            "added charm cs:trusty/wordpress-47",
            "service wordpress deployed (charm: cs:trusty/wordpress-47)",
            "related wordpress:db and mysql:server",
            "added mysql/0 unit to new machine",
            "added wordpress/0 unit to new machine",
        ]
    );
    assert_eq!(
        model.charms_in_model(),
        ["cs:trusty/mysql-42", "cs:trusty/wordpress-47"]
    );
    assert_eq!(
        model.service_charm("mysql").as_deref(),
        Some("cs:trusty/mysql-42")
    );
    assert_eq!(
        model.service_charm("wordpress").as_deref(),
        Some("cs:trusty/wordpress-47")
    );
    assert_eq!(
        model.relations(),
        [("wordpress:db".to_string(), "mysql:server".to_string())]
    );
    assert_eq!(
        unit_map(&model),
        BTreeMap::from([
            ("mysql/0".to_string(), "0".to_string()),
            ("wordpress/0".to_string(), "1".to_string()),
        ])
    );
}

#[tokio::test]
async fn wordpress_simple_second_deploy() {
    let model = wordpress_simple_model();
    let (_, result) = deploy_yaml(&model, WORDPRESS_SIMPLE).await;
    result.unwrap();
    let (lines, result) = deploy_yaml(&model, WORDPRESS_SIMPLE).await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/mysql-42",
            "reusing service mysql (charm: cs:trusty/mysql-42)",
            "added charm cs:trusty/wordpress-47",
            "reusing service wordpress (charm: cs:trusty/wordpress-47)",
            "wordpress:db and mysql:server are already related",
            "avoid adding new units to service mysql: 1 unit already present",
            "avoid adding new units to service wordpress: 1 unit already present",
        ]
    );
    // The second run changed nothing.
    assert_eq!(
        unit_map(&model),
        BTreeMap::from([
            ("mysql/0".to_string(), "0".to_string()),
            ("wordpress/0".to_string(), "1".to_string()),
        ])
    );
    assert_eq!(model.relations().len(), 1);
}

const PLACEMENT_BUNDLE: &str = r#"
services:
    wp:
        charm: cs:trusty/wordpress-0
        num_units: 2
        to:
            - "1"
            - lxc:2
        options:
            blog-title: these are the voyages
    sql:
        charm: cs:trusty/mysql
        num_units: 2
        to:
            - lxc:wp/0
            - new
machines:
    1:
        series: trusty
    2:
"#;

#[tokio::test]
async fn machines_and_units_placement() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/mysql-2");
    model.upload_charm("cs:trusty/wordpress-0");
    let (lines, result) = deploy_yaml(&model, PLACEMENT_BUNDLE).await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/mysql-2",
            "service sql deployed (charm: cs:trusty/mysql-2)",
            "added charm cs:trusty/wordpress-0",
            "service wp deployed (charm: cs:trusty/wordpress-0)",
            "service wp configured",
            "created new machine 0 for holding wp unit",
            "created new machine 1 for holding wp unit",
            "added wp/0 unit to machine 0",
            "created 0/lxc/0 container in machine 0 for holding sql unit",
            "created new machine 2 for holding sql unit",
            "created 1/lxc/0 container in machine 1 for holding wp unit",
            "added sql/0 unit to machine 0/lxc/0",
            "added sql/1 unit to machine 2",
            "added wp/1 unit to machine 1/lxc/0",
        ]
    );
    assert_eq!(
        unit_map(&model),
        BTreeMap::from([
            ("wp/0".to_string(), "0".to_string()),
            ("wp/1".to_string(), "1/lxc/0".to_string()),
            ("sql/0".to_string(), "0/lxc/0".to_string()),
            ("sql/1".to_string(), "2".to_string()),
        ])
    );
}

#[tokio::test]
async fn placement_redeploy_avoids_everything() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/mysql-2");
    model.upload_charm("cs:trusty/wordpress-0");
    let (_, result) = deploy_yaml(&model, PLACEMENT_BUNDLE).await;
    result.unwrap();
    let before = unit_map(&model);

    let (lines, result) = deploy_yaml(&model, PLACEMENT_BUNDLE).await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/mysql-2",
            "reusing service sql (charm: cs:trusty/mysql-2)",
            "added charm cs:trusty/wordpress-0",
            "reusing service wp (charm: cs:trusty/wordpress-0)",
            "service wp configured",
            "avoid creating other machines to host wp units: 2 units already present",
            "avoid adding new units to service wp: 2 units already present",
            "avoid creating other machines to host sql units: 2 units already present",
            "avoid adding new units to service sql: 2 units already present",
        ]
    );
    assert_eq!(unit_map(&model), before);
}

#[tokio::test]
async fn scale_up_adds_only_missing_units() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/django-42");
    let (_, result) = deploy_yaml(
        &model,
        r#"
services:
    django:
        charm: cs:trusty/django-42
        num_units: 2
"#,
    )
    .await;
    result.unwrap();

    let (lines, result) = deploy_yaml(
        &model,
        r#"
services:
    django:
        charm: cs:trusty/django-42
        num_units: 5
"#,
    )
    .await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/django-42",
            "reusing service django (charm: cs:trusty/django-42)",
            "added django/2 unit to new machine",
            "added django/3 unit to new machine",
            "added django/4 unit to new machine",
            "avoid adding new units to service django: 5 units already present",
        ]
    );
    assert_eq!(
        unit_map(&model),
        BTreeMap::from([
            ("django/0".to_string(), "0".to_string()),
            ("django/1".to_string(), "1".to_string()),
            ("django/2".to_string(), "2".to_string()),
            ("django/3".to_string(), "3".to_string()),
            ("django/4".to_string(), "4".to_string()),
        ])
    );
}

#[tokio::test]
async fn incompatible_upgrade_fails() {
    let model = FakeModel::new();
    model.seed_service("wordpress", "local:quantal/wordpress-3");
    model.upload_charm("cs:trusty/incompatible-42");
    let (_, result) = deploy_yaml(
        &model,
        r#"
services:
    wordpress:
        charm: trusty/incompatible-42
        num_units: 1
"#,
    )
    .await;
    let err = result.unwrap_err();
    let message = err.to_string();
    assert!(
        message.starts_with(r#"cannot upgrade service "wordpress""#),
        "unexpected error: {message}"
    );
    assert!(
        message.contains(
            r#"bundle charm "cs:trusty/incompatible-42" is incompatible with existing charm "local:quantal/wordpress-3""#
        ),
        "unexpected error: {message}"
    );
    // The existing service was left alone.
    assert_eq!(
        model.service_charm("wordpress").as_deref(),
        Some("local:quantal/wordpress-3")
    );
}

#[tokio::test]
async fn units_colocated_on_service_units() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/django-42");
    model.upload_charm("cs:trusty/wordpress-0");
    let (lines, result) = deploy_yaml(
        &model,
        r#"
services:
    wordpress:
        charm: wordpress
        num_units: 3
    django:
        charm: cs:trusty/django-42
        num_units: 2
        to: [wordpress]
"#,
    )
    .await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/django-42",
            "service django deployed (charm: cs:trusty/django-42)",
            "added charm cs:trusty/wordpress-0",
            "service wordpress deployed (charm: cs:trusty/wordpress-0)",
            "added wordpress/0 unit to new machine",
            "added wordpress/1 unit to new machine",
            "added wordpress/2 unit to new machine",
            "added django/0 unit to machine 0",
            "added django/1 unit to machine 1",
        ]
    );
    assert_eq!(
        unit_map(&model),
        BTreeMap::from([
            ("django/0".to_string(), "0".to_string()),
            ("django/1".to_string(), "1".to_string()),
            ("wordpress/0".to_string(), "0".to_string()),
            ("wordpress/1".to_string(), "1".to_string()),
            ("wordpress/2".to_string(), "2".to_string()),
        ])
    );
}

#[tokio::test]
async fn service_options_are_configured() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/wordpress-42");
    model.upload_charm("cs:precise/dummy-0");
    let (lines, result) = deploy_yaml(
        &model,
        r#"
services:
    wordpress:
        charm: wordpress
        num_units: 1
        options:
            blog-title: these are the voyages
    customized:
        charm: precise/dummy-0
        num_units: 1
        options:
            username: who
            skill-level: 47
"#,
    )
    .await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:precise/dummy-0",
            "service customized deployed (charm: cs:precise/dummy-0)",
            "service customized configured",
            "added charm cs:trusty/wordpress-42",
            "service wordpress deployed (charm: cs:trusty/wordpress-42)",
            "service wordpress configured",
            "added customized/0 unit to new machine",
            "added wordpress/0 unit to new machine",
        ]
    );
    let config = model.service_config("customized");
    assert_eq!(config["username"], serde_yaml::Value::from("who"));
    assert_eq!(config["skill-level"], serde_yaml::Value::from(47));
    let config = model.service_config("wordpress");
    assert_eq!(
        config["blog-title"],
        serde_yaml::Value::from("these are the voyages")
    );
}

#[tokio::test]
async fn compatible_revision_is_upgraded() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/wordpress-42");
    model.upload_charm("cs:vivid/upgrade-1");
    let (_, result) = deploy_yaml(
        &model,
        r#"
services:
    wordpress:
        charm: wordpress-42
        num_units: 1
        options:
            blog-title: these are the voyages
    up:
        charm: vivid/upgrade-1
        num_units: 1
"#,
    )
    .await;
    result.unwrap();

    model.upload_charm("cs:vivid/upgrade-2");
    let (lines, result) = deploy_yaml(
        &model,
        r#"
services:
    wordpress:
        charm: wordpress-42
        num_units: 1
        options:
            blog-title: new title
    up:
        charm: vivid/upgrade-2
        num_units: 1
"#,
    )
    .await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:vivid/upgrade-2",
            "upgraded charm for existing service up (from cs:vivid/upgrade-1 to cs:vivid/upgrade-2)",
            "added charm cs:trusty/wordpress-42",
            "reusing service wordpress (charm: cs:trusty/wordpress-42)",
            "service wordpress configured",
            "avoid adding new units to service up: 1 unit already present",
            "avoid adding new units to service wordpress: 1 unit already present",
        ]
    );
    assert_eq!(
        model.service_charm("up").as_deref(),
        Some("cs:vivid/upgrade-2")
    );
    let config = model.service_config("wordpress");
    assert_eq!(config["blog-title"], serde_yaml::Value::from("new title"));
}

#[tokio::test]
async fn gated_charm_acquires_macaroon() {
    let model = wordpress_simple_model();
    model.gate_charm("cs:trusty/wordpress-47");
    let (lines, result) = deploy_yaml(&model, WORDPRESS_SIMPLE).await;
    result.unwrap();
    assert!(lines.contains(&"added charm cs:trusty/wordpress-47".to_string()));
    assert_eq!(
        model.issued_macaroons(),
        ["is-entity cs:trusty/wordpress-47"]
    );
    assert_eq!(
        model.charms_in_model(),
        ["cs:trusty/mysql-42", "cs:trusty/wordpress-47"]
    );
}

#[tokio::test]
async fn machine_attributes_are_passed_through() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/django-42");
    let (lines, result) = deploy_yaml(
        &model,
        r#"
services:
    django:
        charm: cs:trusty/django-42
        num_units: 2
        to:
            - "1"
            - new
machines:
    1:
        series: trusty
        constraints: "cpu-cores=4 mem=4G"
"#,
    )
    .await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/django-42",
            "service django deployed (charm: cs:trusty/django-42)",
            "created new machine 0 for holding django unit",
            "added django/0 unit to machine 0",
            "created new machine 1 for holding django unit",
            "added django/1 unit to machine 1",
        ]
    );
    let args = model.machine_args();
    assert_eq!(args.len(), 2);
    assert_eq!(args[0].series.as_deref(), Some("trusty"));
    assert_eq!(args[0].constraints, "cpu-cores=4 mem=4096M");
    assert_eq!(args[1].series, None);
    assert_eq!(args[1].constraints, "");
}

#[tokio::test]
async fn unknown_container_type_fails_at_machine_creation() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/wordpress-42");
    let (_, result) = deploy_yaml(
        &model,
        r#"
services:
    wp:
        charm: trusty/wordpress-42
        num_units: 1
        to: ["bad:1"]
machines:
    1:
"#,
    )
    .await;
    let err = result.unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"cannot create machine for hosting "wp" unit: invalid container type "bad""#
    );
}

#[tokio::test]
async fn unresolvable_charm_fails() {
    let model = FakeModel::new();
    let (lines, result) = deploy_yaml(
        &model,
        r#"
services:
    rails:
        charm: trusty/rails-42
        num_units: 1
"#,
    )
    .await;
    let err = result.unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"cannot resolve URL "trusty/rails-42": charm or bundle not found"#
    );
    assert!(lines.is_empty());
    assert!(matches!(err, DeployError::ResolveCharm { .. }));
}

#[tokio::test]
async fn failed_deploy_keeps_partial_state_and_rerun_converges() {
    let model = FakeModel::new();
    model.upload_charm("cs:trusty/mysql-42");
    // wordpress is not published, so the second addCharm fails after
    // mysql has already been deployed.
    let (lines, result) = deploy_yaml(&model, WORDPRESS_SIMPLE).await;
    result.unwrap_err();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/mysql-42",
            "service mysql deployed (charm: cs:trusty/mysql-42)",
        ]
    );
    assert_eq!(model.service_charm("mysql").as_deref(), Some("cs:trusty/mysql-42"));

    // Publishing the missing charm and re-running converges.
    model.upload_charm("cs:trusty/wordpress-47");
    let (lines, result) = deploy_yaml(&model, WORDPRESS_SIMPLE).await;
    result.unwrap();
    assert_eq!(
        lines,
        [
            "added charm cs:trusty/mysql-42",
            "reusing service mysql (charm: cs:trusty/mysql-42)",
            "added charm cs:trusty/wordpress-47",
            "service wordpress deployed (charm: cs:trusty/wordpress-47)",
            "related wordpress:db and mysql:server",
            "added mysql/0 unit to new machine",
            "added wordpress/0 unit to new machine",
        ]
    );
}
