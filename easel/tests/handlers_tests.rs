use easel::handlers::*;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};
use url::Url;

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://artvee.com/c/landscapes/");
    assert_eq!(result, Some("https://artvee.com/c/landscapes/".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    let result = parse_url_line("artvee.com/artist/claude-monet/");
    assert_eq!(
        result,
        Some("https://artvee.com/artist/claude-monet/".to_string())
    );
}

#[test]
fn test_parse_url_line_invalid() {
    assert_eq!(parse_url_line("not a valid url!!!"), None);
    assert_eq!(parse_url_line("nodots"), None);
    assert_eq!(parse_url_line(""), None);
}

#[test]
fn test_load_urls_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "https://artvee.com/c/landscapes/")?;
    writeln!(temp_file, "# favourite painters")?;
    writeln!(temp_file, "artvee.com/artist/claude-monet/")?;
    writeln!(temp_file)?; // Empty line
    writeln!(temp_file, "  https://artvee.com/main/?s=bird  ")?;

    let path = PathBuf::from(temp_file.path());
    let urls = load_urls_from_file(&path)?;

    assert_eq!(urls.len(), 3);
    assert_eq!(urls[0], "https://artvee.com/c/landscapes/");
    assert_eq!(urls[1], "https://artvee.com/artist/claude-monet/");
    assert_eq!(urls[2], "https://artvee.com/main/?s=bird");

    Ok(())
}

#[test]
fn test_load_urls_from_file_empty() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file).unwrap();
    writeln!(temp_file, "   ").unwrap();
    writeln!(temp_file, "# only a comment").unwrap();

    let path = PathBuf::from(temp_file.path());
    let result = load_urls_from_file(&path);

    assert!(result.is_err());
    assert!(result.unwrap_err().contains("No valid URLs"));
}

#[test]
fn test_load_urls_from_missing_file() {
    let result = load_urls_from_file(&PathBuf::from("/definitely/not/here.txt"));
    assert!(result.unwrap_err().contains("Failed to read URLs file"));
}

#[test]
fn test_load_urls_from_source_single_url() {
    let url = Url::parse("https://artvee.com/topics/birds").unwrap();
    let result = load_urls_from_source(Some(&url), None).unwrap();

    assert_eq!(result, vec!["https://artvee.com/topics/birds".to_string()]);
}

#[test]
fn test_load_urls_from_source_no_input() {
    let result = load_urls_from_source(None, None);
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .contains("Either --url or --urls-file must be provided")
    );
}

// ============================================================================
// Settings resolution
// ============================================================================

fn archive_command() -> clap::Command {
    clap::Command::new("archive")
        .arg(clap::arg!(-c --"config" <PATH>).value_parser(clap::value_parser!(PathBuf)))
        .arg(clap::arg!(-o --"output" <PATH>).value_parser(clap::value_parser!(PathBuf)))
        .arg(clap::arg!(-t --"workers" <N>).value_parser(clap::value_parser!(usize)))
        .arg(clap::arg!(--"cookie" <COOKIE>))
}

#[test]
fn test_settings_defaults_without_flags() {
    let matches = archive_command().get_matches_from(["archive"]);
    let settings = settings_from_matches(&matches).unwrap();

    assert_eq!(settings.workers, 5);
    assert_eq!(settings.output_dir, PathBuf::from("Artvee Artworks"));
    assert_eq!(settings.site_url, "https://artvee.com");
}

#[test]
fn test_flags_override_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("easel.json");
    std::fs::write(
        &config,
        r#"{"workers": 2, "output_dir": "/srv/art", "session_cookie": "a=b"}"#,
    )
    .unwrap();

    let matches = archive_command().get_matches_from([
        "archive",
        "--config",
        config.to_str().unwrap(),
        "-t",
        "9",
    ]);
    let settings = settings_from_matches(&matches).unwrap();

    assert_eq!(settings.workers, 9);
    assert_eq!(settings.output_dir, PathBuf::from("/srv/art"));
    assert_eq!(settings.session_cookie.as_deref(), Some("a=b"));
}

#[test]
fn test_zero_workers_rejected() {
    let matches = archive_command().get_matches_from(["archive", "-t", "0"]);
    assert!(settings_from_matches(&matches).is_err());
}

#[test]
fn test_missing_config_file_is_an_error() {
    let matches = archive_command().get_matches_from(["archive", "-c", "/no/such/easel.json"]);
    let err = settings_from_matches(&matches).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load settings"));
}
