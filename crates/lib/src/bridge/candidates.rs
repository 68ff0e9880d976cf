//! Candidate generator: the ordered (host, Authorization header) matrix tried per request.
//!
//! Built fresh for every call from [`UpstreamSettings`]; never cached.

use crate::bridge::error::BridgeError;
use crate::config::{
    UpstreamSettings, ENV_AGENT_ID, ENV_API_KEY, ENV_PROJECT_ID, ENV_REGION,
};
use std::fmt;

/// Authorization header encodings accepted by some deployment of the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFormat {
    /// `<tenant>:<key>:<region>`
    TenantKeyRegion,
    /// `<tenant>:<key>`
    TenantKey,
    /// `Bearer <key>`
    Bearer,
    /// `<key>`
    BareKey,
}

impl AuthFormat {
    pub fn label(self) -> &'static str {
        match self {
            AuthFormat::TenantKeyRegion => "tenant:key:region",
            AuthFormat::TenantKey => "tenant:key",
            AuthFormat::Bearer => "bearer",
            AuthFormat::BareKey => "key",
        }
    }
}

/// One (host, Authorization header) pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Protocol + domain, no trailing slash.
    pub host: String,
    pub auth_header: String,
    pub format: AuthFormat,
}

// Credentials stay out of logs.
impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("host", &self.host)
            .field("format", &self.format.label())
            .finish()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.format.label())
    }
}

/// Settings that passed validation; every required value is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub project_id: String,
    pub api_key: String,
    pub agent_id: String,
    pub region: Option<String>,
    pub cluster: Option<String>,
    pub domain: String,
    pub hosts: Vec<String>,
}

/// Check required settings. Reports every missing value at once, by env var name.
pub fn validate(settings: &UpstreamSettings) -> Result<Credentials, BridgeError> {
    let mut missing = Vec::new();
    let has_host = settings.region.is_some() || settings.cluster.is_some() || !settings.hosts.is_empty();
    if !has_host {
        missing.push(ENV_REGION.to_string());
    }
    if settings.project_id.is_none() {
        missing.push(ENV_PROJECT_ID.to_string());
    }
    if settings.api_key.is_none() {
        missing.push(ENV_API_KEY.to_string());
    }
    if settings.agent_id.is_none() {
        missing.push(ENV_AGENT_ID.to_string());
    }
    let (Some(project_id), Some(api_key), Some(agent_id), true) = (
        settings.project_id.clone(),
        settings.api_key.clone(),
        settings.agent_id.clone(),
        has_host,
    ) else {
        return Err(BridgeError::Configuration { missing });
    };

    let is_label = |label: &Option<String>| label.as_deref() == Some(project_id.as_str());
    if project_id.eq_ignore_ascii_case("usa") || is_label(&settings.region) || is_label(&settings.cluster) {
        return Err(BridgeError::Misconfigured {
            field: ENV_PROJECT_ID.to_string(),
            got: project_id,
            hint: "the project id is not the region; copy it from the project settings".to_string(),
        });
    }

    Ok(Credentials {
        project_id,
        api_key,
        agent_id,
        region: settings.region.clone(),
        cluster: settings.cluster.clone(),
        domain: settings.domain.clone(),
        hosts: settings.hosts.clone(),
    })
}

/// Hosts in priority order: explicit hosts verbatim, else `https://api-<label>.<domain>` for
/// region then cluster (deduplicated).
pub fn hosts(creds: &Credentials) -> Vec<String> {
    if !creds.hosts.is_empty() {
        let mut out: Vec<String> = Vec::new();
        for h in &creds.hosts {
            if !out.contains(h) {
                out.push(h.clone());
            }
        }
        return out;
    }
    let mut out: Vec<String> = Vec::new();
    for label in [creds.region.as_deref(), creds.cluster.as_deref()]
        .into_iter()
        .flatten()
    {
        let host = format!("https://api-{}.{}", label, creds.domain);
        if !out.contains(&host) {
            out.push(host);
        }
    }
    out
}

/// Authorization header values, most specific first, bare key last.
pub fn auth_headers(creds: &Credentials) -> Vec<(AuthFormat, String)> {
    let key = &creds.api_key;
    let tenant = &creds.project_id;
    let mut out: Vec<(AuthFormat, String)> = Vec::with_capacity(4);
    if let Some(region) = creds.region.as_deref().or(creds.cluster.as_deref()) {
        out.push((
            AuthFormat::TenantKeyRegion,
            format!("{}:{}:{}", tenant, key, region),
        ));
    }
    out.push((AuthFormat::TenantKey, format!("{}:{}", tenant, key)));
    out.push((AuthFormat::Bearer, format!("Bearer {}", key)));
    out.push((AuthFormat::BareKey, key.clone()));
    out
}

/// Flattened matrix: hosts outer, auth encodings inner. Deterministic for fixed settings.
pub fn build_candidates(creds: &Credentials) -> Vec<Candidate> {
    let auths = auth_headers(creds);
    hosts(creds)
        .into_iter()
        .flat_map(|host| {
            auths.iter().map(move |(format, header)| Candidate {
                host: host.clone(),
                auth_header: header.clone(),
                format: *format,
            })
        })
        .collect()
}

/// Validate then build; the usual entry point.
pub fn generate(settings: &UpstreamSettings) -> Result<(Credentials, Vec<Candidate>), BridgeError> {
    let creds = validate(settings)?;
    let candidates = build_candidates(&creds);
    Ok((creds, candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_UPSTREAM_DOMAIN;

    fn settings() -> UpstreamSettings {
        UpstreamSettings {
            region: Some("bcbe5a".into()),
            cluster: None,
            project_id: Some("proj".into()),
            api_key: Some("sk".into()),
            agent_id: Some("agent".into()),
            domain: DEFAULT_UPSTREAM_DOMAIN.into(),
            hosts: Vec::new(),
            request_timeout: std::time::Duration::from_secs(1),
        }
    }

    #[test]
    fn matrix_is_ordered_most_specific_first() {
        let (_, c) = generate(&settings()).expect("valid settings");
        let headers: Vec<&str> = c.iter().map(|c| c.auth_header.as_str()).collect();
        assert_eq!(headers, vec!["proj:sk:bcbe5a", "proj:sk", "Bearer sk", "sk"]);
        assert!(c
            .iter()
            .all(|c| c.host == "https://api-bcbe5a.stack.tryrelevance.com"));
    }

    #[test]
    fn same_settings_same_matrix() {
        let mut s = settings();
        s.cluster = Some("d7b62b".into());
        let (_, a) = generate(&s).expect("valid");
        let (_, b) = generate(&s).expect("valid");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_eq!(a[0].host, "https://api-bcbe5a.stack.tryrelevance.com");
        assert_eq!(a[4].host, "https://api-d7b62b.stack.tryrelevance.com");
    }

    #[test]
    fn duplicate_labels_collapse_to_one_host() {
        let mut s = settings();
        s.cluster = Some("bcbe5a".into());
        let (creds, c) = generate(&s).expect("valid");
        assert_eq!(hosts(&creds).len(), 1);
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn explicit_hosts_replace_label_scheme() {
        let mut s = settings();
        s.hosts = vec!["http://127.0.0.1:9000".into()];
        let (_, c) = generate(&s).expect("valid");
        assert_eq!(c[0].host, "http://127.0.0.1:9000");
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn every_missing_value_is_named() {
        let s = UpstreamSettings::default();
        let err = generate(&s).expect_err("nothing configured");
        assert_eq!(
            err,
            BridgeError::Configuration {
                missing: vec![
                    ENV_REGION.to_string(),
                    ENV_PROJECT_ID.to_string(),
                    ENV_API_KEY.to_string(),
                    ENV_AGENT_ID.to_string(),
                ]
            }
        );
    }

    #[test]
    fn only_the_key_missing() {
        let mut s = settings();
        s.api_key = None;
        let err = validate(&s).expect_err("key missing");
        assert_eq!(
            err,
            BridgeError::Configuration {
                missing: vec![ENV_API_KEY.to_string()]
            }
        );
    }

    #[test]
    fn project_equal_to_region_is_rejected() {
        let mut s = settings();
        s.project_id = Some("bcbe5a".into());
        assert!(matches!(
            validate(&s),
            Err(BridgeError::Misconfigured { .. })
        ));
    }

    #[test]
    fn usa_project_is_rejected_without_a_region() {
        let mut s = settings();
        s.region = None;
        s.cluster = Some("d7b62b".into());
        s.project_id = Some("USA".into());
        assert!(matches!(
            validate(&s),
            Err(BridgeError::Misconfigured { .. })
        ));
        s.project_id = Some("d7b62b".into());
        assert!(matches!(
            validate(&s),
            Err(BridgeError::Misconfigured { .. })
        ));
    }

    #[test]
    fn debug_output_hides_credentials() {
        let (_, c) = generate(&settings()).expect("valid");
        let dbg = format!("{:?}", c[0]);
        assert!(!dbg.contains(&c[0].auth_header));
        assert!(dbg.contains("tenant:key:region"));
    }
}
