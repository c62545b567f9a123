#[cfg(test)]
mod tests {
    use super::super::*;
    use secrecy::ExposeSecret;

    const EXAMPLE: &str = include_str!("../../../../cdrforge.example.toml");

    #[test]
    fn test_example_config_parses() {
        let config = Config::from_toml_str(EXAMPLE).unwrap();
        assert_eq!(config.pipeline.variant_count, 100);
        assert_eq!(config.pipeline.regions.len(), 6);
        assert_eq!(config.targets.len(), 4);
        assert_eq!(config.targets[0].chains.heavy, "D");
        assert!(config.generation.api_key.is_none());
        assert!(config.numbering.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.pipeline.sampling_temperature, 0.8);
        assert_eq!(config.pipeline.output_directory, PathBuf::from("results"));
        assert_eq!(config.structure.timeout_secs, 30);
        assert_eq!(config.generation.timeout_secs, 600);
        assert_eq!(config.structure.base_url, "https://files.rcsb.org/download");
        assert_eq!(config.panel().targets.len(), 4);
    }

    #[test]
    fn test_numbering_scheme_defaults_to_chothia() {
        let config = Config::from_toml_str(
            "[numbering]\nendpoint = \"http://127.0.0.1:8001/v1/number\"\n",
        )
        .unwrap();
        assert_eq!(config.numbering.unwrap().scheme, "chothia");
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let config = Config::from_toml_str("[generation]\napi_key = \"  \"\n").unwrap();
        assert!(config.generation.api_key.is_none());

        let config = Config::from_toml_str("[generation]\napi_key = \"abc\"\n").unwrap();
        assert_eq!(config.generation.api_key.unwrap().expose_secret(), "abc");
    }

    #[test]
    fn test_debug_output_hides_api_key() {
        let config = Config::from_toml_str("[generation]\napi_key = \"very-secret\"\n").unwrap();
        assert!(!format!("{:?}", config).contains("very-secret"));
    }

    #[test]
    fn test_invalid_parameters_are_config_errors() {
        let config = Config::from_toml_str("[pipeline]\nvariant_count = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(CdrForgeError::Config(_))));

        let config = Config::from_toml_str("[pipeline]\nsampling_temperature = -1.0\n").unwrap();
        assert!(matches!(config.validate(), Err(CdrForgeError::Config(_))));
    }

    #[test]
    fn test_unknown_region_is_rejected() {
        assert!(Config::from_toml_str("[pipeline]\nregions = [\"CDRH4\"]\n").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_missing_default_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::read(&dir.path().join(DEFAULT_CONFIG_FILE), false).unwrap();
        assert_eq!(config.pipeline.variant_count, 100);
    }
}
