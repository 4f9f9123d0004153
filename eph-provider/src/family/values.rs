use eph_config::ProvisioningSettings;
use eph_core::{WorkspaceId, WorkspaceSpec};
use serde_yaml_ng::{Mapping, Value};

use super::Cloud;

/// TLS secret replicated into every workspace namespace.
const WILDCARD_SECRET: &str = "workspace-wildcard";
const PACHD_PEER_ADDRESS: &str = "pachd-peer:30653";

pub(super) fn empty() -> Value {
    Value::Mapping(Mapping::new())
}

/// Set `value` at `path`, creating intermediate mappings.
fn set(doc: &mut Value, path: &[&str], value: impl Into<Value>) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = doc;
    for key in parents {
        if !cursor.is_mapping() {
            *cursor = empty();
        }
        let Value::Mapping(map) = cursor else {
            return;
        };
        cursor = map
            .entry(Value::from(*key))
            .or_insert_with(empty);
    }
    if !cursor.is_mapping() {
        *cursor = empty();
    }
    if let Value::Mapping(map) = cursor {
        map.insert(Value::from(*last), value.into());
    }
}

fn callback_uri(host: &str) -> String {
    format!("https://{host}/dex/callback")
}

pub(super) fn defaults(cloud: Cloud, host: &str, p: &ProvisioningSettings) -> Value {
    let mut doc = empty();
    let target = match cloud {
        Cloud::Google => "GOOGLE",
        Cloud::Amazon => "AMAZON",
    };
    set(&mut doc, &["deployTarget"], target);

    set(&mut doc, &["global", "postgresql", "postgresqlPassword"], p.postgres_password.as_str());
    set(
        &mut doc,
        &["global", "postgresql", "postgresqlPostgresPassword"],
        p.postgres_password.as_str(),
    );

    set(&mut doc, &["console", "enabled"], true);
    set(&mut doc, &["console", "config", "oauthClientID"], "console");
    set(&mut doc, &["console", "config", "oauthClientSecret"], p.console_oauth_secret.as_str());
    set(&mut doc, &["console", "config", "graphqlPort"], 4000);
    set(&mut doc, &["console", "config", "pachdAddress"], PACHD_PEER_ADDRESS);
    set(&mut doc, &["console", "config", "disableTelemetry"], false);

    set(&mut doc, &["pachd", "oidcRedirectURI"], callback_uri(host));
    set(&mut doc, &["pachd", "oauthClientSecret"], p.pachd_oauth_secret.as_str());
    set(&mut doc, &["pachd", "rootToken"], p.root_token.as_str());
    set(&mut doc, &["pachd", "enterpriseLicenseKey"], p.enterprise_license.as_str());
    set(
        &mut doc,
        &["pachd", "annotations", "cluster-autoscaler.kubernetes.io/safe-to-evict"],
        "true",
    );

    set(&mut doc, &["proxy", "enabled"], true);
    set(&mut doc, &["proxy", "tls", "enabled"], true);
    set(&mut doc, &["proxy", "service", "type"], "LoadBalancer");

    set(&mut doc, &["oidc", "mockIDP"], false);
    doc
}

pub(super) fn computed(
    cloud: Cloud,
    id: &WorkspaceId,
    host: &str,
    spec: &WorkspaceSpec,
    p: &ProvisioningSettings,
) -> Value {
    let mut doc = empty();
    set(&mut doc, &["proxy", "host"], host);
    set(&mut doc, &["proxy", "tls", "secretName"], WILDCARD_SECRET);

    set(&mut doc, &["oidc", "issuerURI"], format!("https://{host}/dex"));
    let mut upstream = empty();
    set(&mut upstream, &["id"], "auth0");
    set(&mut upstream, &["name"], "auth0");
    set(&mut upstream, &["type"], "oidc");
    set(&mut upstream, &["config", "issuer"], p.auth_domain.as_str());
    set(&mut upstream, &["config", "clientID"], p.client_id.as_str());
    set(&mut upstream, &["config", "clientSecret"], p.client_secret.as_str());
    set(&mut upstream, &["config", "redirectURI"], callback_uri(host));
    set(&mut doc, &["oidc", "upstreamIDPs"], Value::Sequence(vec![upstream]));

    let storage = match cloud {
        Cloud::Google => "google",
        Cloud::Amazon => "amazon",
    };
    set(&mut doc, &["pachd", "storage", storage, "bucket"], id.as_str());

    if let Some(tag) = spec.versions.pachd.as_deref().filter(|t| !t.is_empty()) {
        set(&mut doc, &["pachd", "image", "tag"], tag);
    }
    if let Some(tag) = spec.versions.console.as_deref().filter(|t| !t.is_empty()) {
        set(&mut doc, &["console", "image", "tag"], tag);
    }
    doc
}
