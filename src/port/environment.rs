use crate::config::EnvironmentConfig;
use serde::Serialize;
use tracing::{debug, warn};

/// Static facts about the host, captured once at startup and sent with every frame
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub user_mappings: String,
    pub languages: Vec<String>,
}

impl Environment {
    pub async fn capture(config: &EnvironmentConfig) -> Self {
        let user_mappings = match &config.user_mappings_file {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Unable to read user mappings from {}: {}", path.display(), e);
                    String::new()
                }
            },
            None => String::new(),
        };

        let languages = languages_from(
            std::env::var("LANGUAGE").ok().as_deref(),
            std::env::var("LANG").ok().as_deref(),
        );
        debug!("Captured host languages: {:?}", languages);

        Self {
            user_mappings,
            languages,
        }
    }
}

/// Preferred languages as BCP 47 tags from POSIX locale variables
///
/// `LANGUAGE` is a colon separated priority list and wins over `LANG`.
pub fn languages_from(language: Option<&str>, lang: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();

    let candidates = language
        .into_iter()
        .flat_map(|l| l.split(':'))
        .chain(lang);

    for locale in candidates {
        if let Some(tag) = locale_to_tag(locale) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

// `en_US.UTF-8@euro` -> `en-US`
fn locale_to_tag(locale: &str) -> Option<String> {
    let name = locale.split(['.', '@']).next()?.trim();
    if name.is_empty() || name == "C" || name == "POSIX" {
        return None;
    }
    Some(name.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lang_is_converted_to_a_tag() {
        assert_eq!(languages_from(None, Some("en_US.UTF-8")), vec!["en-US"]);
    }

    #[test]
    fn language_list_takes_priority() {
        assert_eq!(
            languages_from(Some("de_DE:fr"), Some("en_US.UTF-8")),
            vec!["de-DE", "fr", "en-US"]
        );
    }

    #[test]
    fn duplicates_and_posix_locales_are_skipped() {
        assert_eq!(
            languages_from(Some("en_US:C::en_US"), Some("en_US.UTF-8")),
            vec!["en-US"]
        );
        assert!(languages_from(None, Some("POSIX")).is_empty());
        assert!(languages_from(None, None).is_empty());
    }

    #[tokio::test]
    async fn user_mappings_come_from_the_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.txt");
        std::fs::write(&path, "pad-a:0,1,2").unwrap();

        let config = EnvironmentConfig {
            user_mappings_file: Some(path),
        };
        let environment = Environment::capture(&config).await;
        assert_eq!(environment.user_mappings, "pad-a:0,1,2");
    }

    #[tokio::test]
    async fn unreadable_mappings_file_degrades_to_empty() {
        let config = EnvironmentConfig {
            user_mappings_file: Some("/nonexistent/padbridge/mappings".into()),
        };
        let environment = Environment::capture(&config).await;
        assert_eq!(environment.user_mappings, "");
    }

    #[test]
    fn serializes_in_camel_case() {
        let environment = Environment {
            user_mappings: "m".to_string(),
            languages: vec!["en".to_string()],
        };
        let json = serde_json::to_string(&environment).unwrap();
        assert_eq!(json, r#"{"userMappings":"m","languages":["en"]}"#);
    }
}
