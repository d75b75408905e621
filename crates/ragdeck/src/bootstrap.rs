//! Turns a [`Profile`] into a ready [`Session`].
//!
//! Bootstrapping runs in three stages. The first failure aborts it with a
//! [`BootstrapError`] naming the stage, which the binary reports once at
//! the top level.

use std::error::Error as StdError;
use std::fmt::{self, Display};

use ragdeck_ollama::OllamaEmbedder;
use ragdeck_openai_model::{OpenAIConfigBuilder, OpenAIGenerator};
use reqwest::Url;
use thiserror::Error;

use crate::profile::{
    FinanceConfig, GEMINI_API_KEY_VAR, Profile, RagConfig, finance_agent,
    rag_agent, rag_knowledge,
};
use crate::session::Session;

/// A bootstrap stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading credentials and building the model handle.
    Configuring(&'static str),
    /// Building tools, knowledge base and the agent.
    InitializingAgent,
    /// Building the session and ingesting initial sources.
    SettingUpUi,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Configuring(provider) => write!(f, "configuring {provider}"),
            Stage::InitializingAgent => write!(f, "initializing agent"),
            Stage::SettingUpUi => write!(f, "setting up UI"),
        }
    }
}

/// Problems in the configuration itself.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential is absent or blank.
    #[error("{0} is not set")]
    MissingCredential(&'static str),
    /// An endpoint is not a valid http(s) URL.
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl {
        /// The offending value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// A failed bootstrap.
#[derive(Debug, Error)]
#[error("Error {stage}: {source}")]
pub struct BootstrapError {
    stage: Stage,
    source: Box<dyn StdError + Send + Sync>,
}

impl BootstrapError {
    /// Returns the stage that failed.
    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

trait StageExt<T> {
    fn at_stage(self, stage: Stage) -> Result<T, BootstrapError>;
}

impl<T, E> StageExt<T> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    #[inline]
    fn at_stage(self, stage: Stage) -> Result<T, BootstrapError> {
        self.map_err(|err| BootstrapError {
            stage,
            source: Box::new(err),
        })
    }
}

/// Runs every stage of `profile`.
///
/// Initial sources are handed to the knowledge base in the background, so
/// this must be called within a tokio runtime.
pub fn bootstrap(profile: Profile) -> Result<Session, BootstrapError> {
    let provider = profile.provider();
    info!("bootstrapping with {provider}");
    match profile {
        Profile::Finance(config) => bootstrap_finance(config, provider),
        Profile::Rag(config) => bootstrap_rag(config, provider),
    }
}

fn bootstrap_finance(
    config: FinanceConfig,
    provider: &'static str,
) -> Result<Session, BootstrapError> {
    let generator =
        configure_gemini(&config).at_stage(Stage::Configuring(provider))?;
    let agent = finance_agent(generator, &config);
    let session = Session::new(agent, None);
    Ok(session)
}

fn bootstrap_rag(
    config: RagConfig,
    provider: &'static str,
) -> Result<Session, BootstrapError> {
    let generator =
        configure_ollama(&config).at_stage(Stage::Configuring(provider))?;

    let ollama_host = validate_url(&config.ollama_host)
        .at_stage(Stage::InitializingAgent)?;
    let embedder =
        OllamaEmbedder::with_host(ollama_host, config.embedding_model.clone());
    let knowledge = rag_knowledge(embedder);
    let agent = rag_agent(generator, knowledge.clone(), config.top_k);

    let mut session = Session::new(agent, Some(knowledge));
    for source in &config.sources {
        session.add_source(source).at_stage(Stage::SettingUpUi)?;
    }
    Ok(session)
}

fn configure_gemini(
    config: &FinanceConfig,
) -> Result<OpenAIGenerator, ConfigError> {
    let api_key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(ConfigError::MissingCredential(GEMINI_API_KEY_VAR))?;

    let mut builder =
        OpenAIConfigBuilder::gemini(api_key).with_model(config.model.clone());
    if let Some(base_url) = &config.base_url {
        builder = builder.with_base_url(validate_url(base_url)?);
    }
    let generator = OpenAIGenerator::new(builder.build());
    debug!("using {:?}", generator.config());
    Ok(generator)
}

fn configure_ollama(
    config: &RagConfig,
) -> Result<OpenAIGenerator, ConfigError> {
    let base_url = match &config.base_url {
        Some(base_url) => validate_url(base_url)?,
        None => {
            let host = validate_url(&config.ollama_host)?;
            format!("{}/v1", host.trim_end_matches('/'))
        }
    };
    let generator = OpenAIGenerator::new(
        OpenAIConfigBuilder::ollama()
            .with_model(config.model.clone())
            .with_base_url(base_url)
            .build(),
    );
    debug!("using {:?}", generator.config());
    Ok(generator)
}

fn validate_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: url.to_owned(),
        reason,
    };
    let parsed = Url::parse(url).map_err(|err| invalid(err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("expected an http(s) URL".to_owned()));
    }
    Ok(url.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential() {
        for api_key in [None, Some(""), Some("   ")] {
            let config = FinanceConfig {
                api_key: api_key.map(str::to_owned),
                ..Default::default()
            };
            let err = bootstrap(Profile::Finance(config)).err().unwrap();
            assert_eq!(err.stage(), Stage::Configuring("Gemini"));
            assert_eq!(
                err.to_string(),
                "Error configuring Gemini: GEMINI_API_KEY is not set"
            );
        }
    }

    #[test]
    fn test_finance() {
        let config = FinanceConfig {
            api_key: Some("test-key".to_owned()),
            ..Default::default()
        };
        let session = bootstrap(Profile::Finance(config)).unwrap();
        assert!(!session.has_knowledge());
        assert!(
            session
                .agent()
                .system_prompt()
                .contains("Always use tables to display financial")
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = FinanceConfig {
            api_key: Some("test-key".to_owned()),
            base_url: Some("not a url".to_owned()),
            ..Default::default()
        };
        let err = bootstrap(Profile::Finance(config)).err().unwrap();
        assert_eq!(err.stage(), Stage::Configuring("Gemini"));
    }

    #[test]
    fn test_invalid_ollama_host() {
        let config = RagConfig {
            base_url: Some("http://localhost:11434/v1".to_owned()),
            ollama_host: "ftp://localhost".to_owned(),
            ..Default::default()
        };
        let err = bootstrap(Profile::Rag(config)).err().unwrap();
        assert_eq!(err.stage(), Stage::InitializingAgent);
        assert!(err.to_string().starts_with("Error initializing agent: "));
    }

    #[tokio::test]
    async fn test_rag_with_sources() {
        let config = RagConfig {
            ollama_host: "http://127.0.0.1:9".to_owned(),
            sources: vec![
                "https://example.com/a.txt".to_owned(),
                "notes.md".to_owned(),
            ],
            ..Default::default()
        };
        let session = bootstrap(Profile::Rag(config)).unwrap();
        assert!(session.has_knowledge());
        let identifiers: Vec<_> = session
            .sources()
            .iter()
            .map(|source| source.identifier())
            .collect();
        assert_eq!(identifiers, ["https://example.com/a.txt", "notes.md"]);
    }

    #[tokio::test]
    async fn test_rag_with_blank_source() {
        let config = RagConfig {
            sources: vec![" ".to_owned()],
            ..Default::default()
        };
        let err = bootstrap(Profile::Rag(config)).err().unwrap();
        assert_eq!(err.stage(), Stage::SettingUpUi);
        assert_eq!(err.to_string(), "Error setting up UI: Please enter a URL");
    }
}
