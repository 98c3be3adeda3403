use crate::endpoints::{
    http_client, Endpoint, Koodous, MalShare, MalwareBazaar, Triage, VirusShare, VirusTotal,
};
use crate::FetchError;

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use tracing::warn;

/// Default amount of concurrent downloads
pub const DEFAULT_THREADS: i64 = 4;

/// Default limit for a single HTTP request to an endpoint, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// API keys and download settings.
///
/// An endpoint is used when its key is present. MalwareBazaar works without a
/// key, so an empty value still enables it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FetchConfiguration {
    /// Amount of concurrent downloads, values below one are treated as one
    #[serde(default = "default_threads")]
    pub threads: i64,

    /// Limit for a single HTTP request to an endpoint, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Hatching Triage API key
    #[serde(default)]
    pub triage: Option<String>,

    /// MalwareBazaar API key
    #[serde(default, alias = "malwarebazaar")]
    pub malware_bazaar: Option<String>,

    /// MalShare API key
    #[serde(default)]
    pub malshare: Option<String>,

    /// VirusShare API key
    #[serde(default)]
    pub virusshare: Option<String>,

    /// VirusTotal API key
    #[serde(default)]
    pub virustotal: Option<String>,

    /// Koodous API key
    #[serde(default)]
    pub koodous: Option<String>,
}

fn default_threads() -> i64 {
    DEFAULT_THREADS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for FetchConfiguration {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            triage: None,
            malware_bazaar: None,
            malshare: None,
            virusshare: None,
            virustotal: None,
            koodous: None,
        }
    }
}

impl FetchConfiguration {
    /// Load the configuration, the format is chosen by the file extension:
    /// `.json`, `.toml` (or none), or `.txt` for `name=value` lines.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .context(format!("failed to read configuration file {path:?}"))?;
        let config = match path.extension().and_then(OsStr::to_str) {
            Some("json") => serde_json::from_str::<Self>(&contents)
                .context(format!("failed to parse json configuration {path:?}"))?,
            None | Some("toml") => toml::from_str::<Self>(&contents)
                .context(format!("failed to parse toml configuration {path:?}"))?,
            Some("txt") => contents.parse::<Self>()?,
            Some(ext) => {
                bail!("Unknown configuration extension {ext}");
            }
        };
        Ok(config)
    }

    /// Names of the enabled endpoints, in the order they are tried
    pub fn platforms(&self) -> Vec<&'static str> {
        let mut platforms = Vec::new();
        if enabled(&self.triage) {
            platforms.push("Triage");
        }
        if self.malware_bazaar.is_some() {
            platforms.push("MalwareBazaar");
        }
        if enabled(&self.malshare) {
            platforms.push("MalShare");
        }
        if enabled(&self.virusshare) {
            platforms.push("VirusShare");
        }
        if enabled(&self.virustotal) {
            platforms.push("VirusTotal");
        }
        if enabled(&self.koodous) {
            platforms.push("Koodous");
        }
        platforms
    }

    /// Build the enabled endpoints. Free services come first so that API
    /// quota on the commercial ones is only spent when needed.
    pub fn endpoints(&self) -> Result<Vec<Box<dyn Endpoint>>> {
        let client = http_client(Duration::from_secs(self.timeout_secs))
            .context("failed to create HTTP client")?;

        let mut endpoints: Vec<Box<dyn Endpoint>> = Vec::with_capacity(6);
        if let Some(key) = key(&self.triage) {
            endpoints.push(Box::new(Triage::new(client.clone(), key)));
        }
        if let Some(key) = &self.malware_bazaar {
            endpoints.push(Box::new(MalwareBazaar::new(
                client.clone(),
                Some(key.trim().to_string()),
            )));
        }
        if let Some(key) = key(&self.malshare) {
            endpoints.push(Box::new(MalShare::new(client.clone(), key)));
        }
        if let Some(key) = key(&self.virusshare) {
            endpoints.push(Box::new(VirusShare::new(client.clone(), key)));
        }
        if let Some(key) = key(&self.virustotal) {
            endpoints.push(Box::new(VirusTotal::new(key)));
        }
        if let Some(key) = key(&self.koodous) {
            endpoints.push(Box::new(Koodous::new(client, key)));
        }

        if endpoints.is_empty() {
            return Err(FetchError::NoEndpoints.into());
        }
        Ok(endpoints)
    }
}

fn enabled(key: &Option<String>) -> bool {
    key.as_deref().is_some_and(|k| !k.trim().is_empty())
}

fn key(key: &Option<String>) -> Option<String> {
    key.as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

impl FromStr for FetchConfiguration {
    type Err = anyhow::Error;

    /// Parse the plain text keys format: one `name=value` per line, names are
    /// case-insensitive, blank lines and lines starting with `#` are ignored.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut config = Self::default();
        for (line_number, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((name, value)) = line.split_once('=') else {
                bail!("line {} is not in the name=value format", line_number + 1);
            };
            let value = value.trim().to_string();
            match name.trim().to_lowercase().as_str() {
                "threads" => {
                    config.threads = value
                        .parse()
                        .context(format!("invalid thread count {value:?}"))?;
                }
                "timeout" | "timeout_secs" => {
                    config.timeout_secs = value
                        .parse()
                        .context(format!("invalid timeout {value:?}"))?;
                }
                "triage" => config.triage = Some(value),
                "malwarebazaar" | "malware_bazaar" => config.malware_bazaar = Some(value),
                "malshare" => config.malshare = Some(value),
                "virusshare" => config.virusshare = Some(value),
                "virustotal" => config.virustotal = Some(value),
                "koodous" => config.koodous = Some(value),
                other => bail!("unknown setting {other:?} on line {}", line_number + 1),
            }
        }
        Ok(config)
    }
}

/// Whether `hash` is a hex-encoded MD5, SHA-1, or SHA-256 hash
pub fn is_sample_hash(hash: &str) -> bool {
    matches!(hash.len(), 32 | 40 | 64) && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Gather hashes from the command line and an optional file with one hash per
/// line. Whitespace is trimmed, blank entries dropped, and duplicates removed.
/// Anything which isn't an MD5, SHA-1, or SHA-256 hash is skipped with a warning,
/// as hashes become file names in the output directory.
pub fn load_hashes(args: &[String], hash_file: Option<&Path>) -> Result<HashSet<String>> {
    let mut candidates: Vec<String> = args.to_vec();

    if let Some(path) = hash_file {
        let path = expand_home(path);
        ensure!(!path.is_dir(), "hash file {path:?} is a directory");
        let contents =
            fs::read_to_string(&path).context(format!("failed to read hash file {path:?}"))?;
        candidates.extend(contents.lines().map(str::to_string));
    }

    let mut hashes = HashSet::with_capacity(candidates.len());
    for candidate in &candidates {
        let hash = candidate.trim();
        if hash.is_empty() {
            continue;
        }
        if !is_sample_hash(hash) {
            warn!("Skipping {hash:?}, it is not an MD5, SHA-1, or SHA-256 hash");
            continue;
        }
        hashes.insert(hash.to_string());
    }

    if hashes.is_empty() {
        return Err(FetchError::NoHashes.into());
    }
    Ok(hashes)
}

/// Expand a leading `~` and create the output directory if needed
pub fn prepare_output_dir(path: &Path) -> Result<PathBuf> {
    let path = expand_home(path);
    if !path.exists() {
        fs::create_dir_all(&path).context(format!("failed to create directory {path:?}"))?;
    }
    ensure!(path.is_dir(), "{path:?} is not a directory");
    Ok(path)
}

/// Replace a leading `~` with the user's home directory
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_text() {
        let config: FetchConfiguration = "\
            Threads=8\n\
            \n\
            # comment\n\
            MalShare=abc\n\
            malwarebazaar=\n\
            KOODOUS= token \n"
            .parse()
            .unwrap();

        assert_eq!(config.threads, 8);
        assert_eq!(config.malshare.as_deref(), Some("abc"));
        assert_eq!(config.malware_bazaar.as_deref(), Some(""));
        assert_eq!(config.koodous.as_deref(), Some("token"));
        assert_eq!(config.triage, None);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn keys_text_errors() {
        assert!("threads=many".parse::<FetchConfiguration>().is_err());
        assert!("malshare".parse::<FetchConfiguration>().is_err());
        assert!("hybridanalysis=abc".parse::<FetchConfiguration>().is_err());
    }

    #[test]
    fn toml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("keys.toml");
        fs::write(&toml_path, "threads = 2\ntriage = \"t\"\nmalwarebazaar = \"\"\n").unwrap();
        let config = FetchConfiguration::from_file(&toml_path).unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.triage.as_deref(), Some("t"));
        assert_eq!(config.platforms(), vec!["Triage", "MalwareBazaar"]);

        let json_path = dir.path().join("keys.json");
        fs::write(&json_path, r#"{"virustotal": "vt", "timeout_secs": 30}"#).unwrap();
        let config = FetchConfiguration::from_file(&json_path).unwrap();
        assert_eq!(config.threads, DEFAULT_THREADS);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.platforms(), vec!["VirusTotal"]);

        let txt_path = dir.path().join("keys.txt");
        fs::write(&txt_path, "virusshare=vs\n").unwrap();
        let config = FetchConfiguration::from_file(&txt_path).unwrap();
        assert_eq!(config.platforms(), vec!["VirusShare"]);

        let yaml_path = dir.path().join("keys.yaml");
        fs::write(&yaml_path, "triage: t\n").unwrap();
        assert!(FetchConfiguration::from_file(&yaml_path).is_err());
    }

    #[test]
    fn endpoint_order() {
        let config: FetchConfiguration = "\
            koodous=k\n\
            virustotal=v\n\
            virusshare=s\n\
            malshare=m\n\
            malwarebazaar=\n\
            triage=t\n"
            .parse()
            .unwrap();

        let endpoints = config.endpoints().unwrap();
        let names: Vec<&str> = endpoints.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["Triage", "MalwareBazaar", "MalShare", "VirusShare", "VirusTotal", "Koodous"]
        );
        assert_eq!(names, config.platforms());
    }

    #[test]
    fn no_endpoints() {
        let config: FetchConfiguration = "threads=2\nmalshare=  \n".parse().unwrap();
        assert!(config.platforms().is_empty());

        let err = config.endpoints().err().unwrap();
        assert_eq!(
            err.downcast_ref::<FetchError>(),
            Some(&FetchError::NoEndpoints)
        );
    }

    const MD5: &str = "44d88612fea8a8f36de82e1278abb02f";
    const SHA1: &str = "3395856ce81f2b7382dee72602f798b642f14140";
    const SHA256: &str = "275a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f";

    #[test]
    fn hashes_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let hash_file = dir.path().join("hashes.txt");
        fs::write(&hash_file, format!("{MD5}\n\n  {SHA1}  \n{MD5}\n")).unwrap();

        let args = vec![SHA256.to_string(), " ".to_string(), SHA1.to_string()];
        let hashes = load_hashes(&args, Some(&hash_file)).unwrap();
        let expected: HashSet<String> = [MD5, SHA1, SHA256].iter().map(|h| h.to_string()).collect();
        assert_eq!(hashes, expected);
    }

    #[test]
    fn hash_format() {
        assert!(is_sample_hash(MD5));
        assert!(is_sample_hash(SHA1));
        assert!(is_sample_hash(SHA256));
        assert!(is_sample_hash(&SHA256.to_uppercase()));
        assert!(!is_sample_hash(&MD5[1..]));
        assert!(!is_sample_hash("zz88612fea8a8f36de82e1278abb02f0"));
        assert!(!is_sample_hash(""));
    }

    #[test]
    fn paths_are_not_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("elsewhere").to_string_lossy().to_string();
        let hash_file = dir.path().join("hashes.txt");
        fs::write(&hash_file, format!("../../etc/cron.d/job\n{outside}\n{MD5}\n")).unwrap();

        let hashes = load_hashes(&[], Some(&hash_file)).unwrap();
        assert_eq!(hashes.len(), 1);
        assert!(hashes.contains(MD5));

        let err = load_hashes(&["../escape".to_string(), outside], None)
            .err()
            .unwrap();
        assert_eq!(err.downcast_ref::<FetchError>(), Some(&FetchError::NoHashes));
    }

    #[test]
    fn no_hashes() {
        let err = load_hashes(&["  ".to_string()], None).err().unwrap();
        assert_eq!(err.downcast_ref::<FetchError>(), Some(&FetchError::NoHashes));
    }

    #[test]
    fn output_dir_created() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("samples").join("2026");
        let prepared = prepare_output_dir(&output).unwrap();
        assert!(prepared.is_dir());

        let file = dir.path().join("file");
        fs::write(&file, b"").unwrap();
        assert!(prepare_output_dir(&file).is_err());
    }

    #[test]
    fn home_expansion() {
        let plain = Path::new("/var/samples");
        assert_eq!(expand_home(plain), plain);

        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/samples")),
                PathBuf::from(home).join("samples")
            );
        }
    }
}
