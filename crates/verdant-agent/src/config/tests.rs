#[cfg(test)]
mod tests {
    use super::super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use verdant_ingestion::sources::crossref::CR_API_BASE;
    use verdant_ingestion::QueryMode;

    const MINIMAL: &str = r#"
        authors = ["Jane Goodall"]
    "#;

    #[test]
    fn test_minimal_file_takes_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.source.base_url, CR_API_BASE);
        assert_eq!(config.source.page_size, 100);
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.pipeline.mode, QueryMode::Incremental { days_back: 7 });
        assert!(config.pipeline.prefilter);
        assert!(!config.pipeline.two_phase);
        assert_eq!(config.database.url_env, "DATABASE_URL");
    }

    #[test]
    fn test_full_file_parses() {
        let config = Config::from_toml(r#"
            authors = ["E. O. Wilson"]

            [database]
            max_connections = 3

            [source]
            mailto = "ops@verdant.example"
            page_size = 50
            request_delay_ms = 250

            [llm]
            provider = "openai"
            model = "qwen2.5:14b"
            base_url = "http://localhost:11434"
            api_key_env = "LOCAL_LLM_KEY"

            [pipeline]
            target = 20000
            wave_size = 4
            wave_delay_ms = 500
            two_phase = true

            [pipeline.mode]
            mode = "backfill"
            from_year = 1990
            until_year = 2010

            [[queries]]
            name = "pollination"
            queries = ["pollinator decline", "bee foraging"]

            [[queries]]
            name = "wetlands"
            queries = ["peatland carbon"]
        "#).unwrap();

        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.source.page_size, 50);
        assert_eq!(config.llm.provider, LlmProvider::Openai);
        assert_eq!(config.llm.key_env(), "LOCAL_LLM_KEY");
        assert_eq!(config.pipeline.mode, QueryMode::Backfill { from_year: 1990, until_year: 2010 });
        assert_eq!(config.queries.len(), 2);
        assert_eq!(config.queries[0].queries, vec!["pollinator decline", "bee foraging"]);
        assert!(config.pipeline.two_phase);
    }

    #[test]
    fn test_pipeline_config_carries_units() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.source.request_delay_ms = 1_500;
        config.pipeline.wave_delay_ms = 2_000;
        config.llm.input_usd_per_mtok = 3.0;

        let pc = config.pipeline_config();
        assert_eq!(pc.request_delay, Duration::from_millis(1_500));
        assert_eq!(pc.wave_delay, Duration::from_secs(2));
        assert_eq!(pc.pricing.input_per_mtok, 3.0);
        assert_eq!(pc.authors, vec!["Jane Goodall"]);
        assert_eq!(pc.cache_dir, PathBuf::from("cache"));
    }

    #[test]
    fn test_default_key_env_follows_provider() {
        let mut llm = LlmConfig::default();
        assert_eq!(llm.key_env(), "ANTHROPIC_API_KEY");
        llm.provider = LlmProvider::Openai;
        assert_eq!(llm.key_env(), "OPENAI_API_KEY");
    }

    #[test]
    fn test_api_key_read_from_named_env() {
        let llm = LlmConfig { api_key_env: Some("VERDANT_TEST_KEY_7F3A".into()), ..LlmConfig::default() };
        assert!(llm.api_key().is_none());
        std::env::set_var("VERDANT_TEST_KEY_7F3A", "sk-test");
        assert_eq!(llm.api_key().unwrap().expose_secret(), "sk-test");
        std::env::set_var("VERDANT_TEST_KEY_7F3A", "  ");
        assert!(llm.api_key().is_none());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(Config::from_toml("").is_err(), "no queries configured");
        assert!(Config::from_toml(r#"
            authors = ["x"]
            [pipeline.mode]
            mode = "backfill"
            from_year = 2010
            until_year = 2000
        "#).is_err());
        assert!(Config::from_toml(r#"
            authors = ["x"]
            [pipeline]
            wave_size = 0
        "#).is_err());
        assert!(Config::from_toml(r#"
            authors = ["x"]
            [llm]
            provider = "openai"
        "#).is_err(), "openai needs a base url");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = std::env::temp_dir().join("verdant-no-such-config.toml");
        let err = Config::load(Some(&dir)).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
