//! Browser-mimic headers expected by the MAppEnterprise endpoints.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::configs::TrafficConfig;

/// Headers sent with every featureanalyzer request.
pub fn dataset_headers(config: &TrafficConfig) -> HeaderMap {
    let referer = format!(
        "{}/Dashboard/?tenant={}&view={}&viewer=1&appId={}&runtime=dashboard-1",
        config.base_url.trim_end_matches('/'),
        config.tenant,
        config.dashboard_view_id,
        config.dashboard_app_id
    );

    to_header_map(&[
        ("user-agent", config.user_agent.as_str()),
        ("accept", "text/plain, */*; q=0.01"),
        ("accept-language", "en-US,en;q=0.9,de-AT;q=0.8,de;q=0.7"),
        ("tenant", config.tenant.as_str()),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("referer", referer.as_str()),
        ("x-requested-with", "XMLHttpRequest"),
    ])
}

/// Headers for the OAuth token request.
pub fn auth_headers(config: &TrafficConfig) -> HeaderMap {
    let referer = format!(
        "{}/Apps/?appId={}&tenant={}",
        config.base_url.trim_end_matches('/'),
        config.auth_app_id,
        config.tenant
    );
    let origin = Url::parse(&config.base_url)
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_default();

    to_header_map(&[
        ("user-agent", config.user_agent.as_str()),
        ("accept", "*/*"),
        ("accept-language", "en-US,en;q=0.9,de-AT;q=0.8,de;q=0.7"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("dnt", "1"),
        ("origin", origin.as_str()),
        ("referer", referer.as_str()),
        ("tenant", config.tenant.as_str()),
        (
            "content-type",
            "application/x-www-form-urlencoded;charset=UTF-8",
        ),
    ])
}

fn to_header_map(header_list: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in header_list {
        if value.is_empty() {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(h_name), Ok(h_value)) => {
                headers.insert(h_name, h_value);
            }
            _ => log::warn!("Skipping invalid header {}: {}", name, value),
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::ConfigLayer;

    #[test]
    fn tenant_and_referer_come_from_config() {
        let config = TrafficConfig::from_layer(ConfigLayer::default()).unwrap();
        let headers = dataset_headers(&config);
        assert_eq!(headers["tenant"], "linz_db");
        assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
        assert!(headers["referer"]
            .to_str()
            .unwrap()
            .starts_with("https://webgis.linz.at/MAppEnterprise/Dashboard/?tenant=linz_db"));

        let auth = auth_headers(&config);
        assert_eq!(auth["origin"], "https://webgis.linz.at");
        assert!(auth["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/x-www-form-urlencoded"));
    }
}
