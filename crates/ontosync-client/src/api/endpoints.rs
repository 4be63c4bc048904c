//! Remote URL builders

/// Suffix stripped from a GraphQL endpoint to reach the backend status route.
pub const GRAPHQL_SUFFIX: &str = "/graphql/";

/// Manifest listing the shards under an assets base URL
pub fn manifest_url(base_url: &str) -> String {
    format!("{}/manifest.json", base_url.trim_end_matches('/'))
}

/// One shard file under an assets base URL
pub fn shard_url(base_url: &str, file_name: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        file_name.trim_start_matches('/')
    )
}

/// Backend status route for a GraphQL endpoint
/// (`https://api.example.org/graphql/` -> `https://api.example.org`).
pub fn status_url(graphql_endpoint: &str) -> String {
    graphql_endpoint
        .strip_suffix(GRAPHQL_SUFFIX)
        .or_else(|| graphql_endpoint.strip_suffix(GRAPHQL_SUFFIX.trim_end_matches('/')))
        .unwrap_or(graphql_endpoint)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_url() {
        assert_eq!(
            manifest_url("https://cdn.example.org/assets"),
            "https://cdn.example.org/assets/manifest.json"
        );
        assert_eq!(
            manifest_url("https://cdn.example.org/assets/"),
            "https://cdn.example.org/assets/manifest.json"
        );
    }

    #[test]
    fn test_shard_url() {
        assert_eq!(
            shard_url("http://localhost:8000/", "icd10cm.csv.gz"),
            "http://localhost:8000/icd10cm.csv.gz"
        );
    }

    #[test]
    fn test_status_url() {
        assert_eq!(status_url("https://api.example.org/graphql/"), "https://api.example.org");
        assert_eq!(status_url("https://api.example.org/graphql"), "https://api.example.org");
        assert_eq!(status_url("https://api.example.org/status"), "https://api.example.org/status");
    }
}
