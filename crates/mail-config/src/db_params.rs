//! Loads `$HOME/scripts/db_params.json` and injects `PGPASSWORD`, the way
//! `acs_messenger.py` reads the same file at import time and splices in the
//! password before ever opening a connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ConfigError;

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct DbParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub dbname: String,
    /// Spliced in from `PGPASSWORD` after the file is parsed — never itself
    /// present in `db_params.json`.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for DbParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("dbname", &self.dbname)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl std::fmt::Debug for LoadedDbParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDbParams")
            .field("params", &self.params)
            .field("config_hash", &self.config_hash)
            .finish()
    }
}

#[derive(Clone)]
pub struct LoadedDbParams {
    pub params: DbParams,
    /// SHA-256 over the canonicalized (sorted-key) JSON body, logged once at
    /// startup so operators can correlate a worker process with the exact
    /// config file it booted with.
    pub config_hash: String,
}

/// Read `{home}/scripts/db_params.json`, parse `{host, port, user, dbname}`,
/// and set `password` from the `PGPASSWORD` environment variable.
pub fn load_db_params(home: &str, pgpassword: Option<String>) -> Result<LoadedDbParams, ConfigError> {
    let path = format!("{home}/scripts/db_params.json");
    load_db_params_from_path(&path, pgpassword)
}

pub fn load_db_params_from_path(
    path: &str,
    pgpassword: Option<String>,
) -> Result<LoadedDbParams, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;

    let config_hash = hash_canonical(&raw, path)?;

    let mut params: DbParams =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
    params.password = pgpassword;

    Ok(LoadedDbParams { params, config_hash })
}

fn hash_canonical(raw: &str, path: &str) -> Result<String, ConfigError> {
    let value: Value = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;
    let canonical = canonicalize_json(&value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn canonicalize_json(v: &Value) -> String {
    serde_json::to_string(&sort_keys(v)).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

impl DbParams {
    /// A `postgres://` connection URL, with the password percent-escaped as
    /// sqlx's URL parser expects.
    pub fn connection_url(&self) -> String {
        let password = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencode(&self.user),
            urlencode(password),
            self.host,
            self.port,
            self.dbname,
        )
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_params_and_injects_password() {
        let mut file = tempfile_with(r#"{"host":"db.internal","port":5432,"user":"mailworker","dbname":"mail"}"#);
        let loaded = load_db_params_from_path(file.path(), Some("hunter2".to_string())).unwrap();
        assert_eq!(loaded.params.host, "db.internal");
        assert_eq!(loaded.params.password.as_deref(), Some("hunter2"));
        file.close();
    }

    #[test]
    fn config_hash_is_stable_regardless_of_key_order() {
        let mut a = tempfile_with(r#"{"host":"h","port":1,"user":"u","dbname":"d"}"#);
        let mut b = tempfile_with(r#"{"port":1,"dbname":"d","host":"h","user":"u"}"#);
        let loaded_a = load_db_params_from_path(a.path(), None).unwrap();
        let loaded_b = load_db_params_from_path(b.path(), None).unwrap();
        assert_eq!(loaded_a.config_hash, loaded_b.config_hash);
        a.close();
        b.close();
    }

    #[test]
    fn connection_url_percent_escapes_the_password() {
        let params = DbParams {
            host: "db".to_string(),
            port: 5432,
            user: "mailworker".to_string(),
            dbname: "mail".to_string(),
            password: Some("p@ss word".to_string()),
        };
        assert_eq!(
            params.connection_url(),
            "postgres://mailworker:p%40ss%20word@db:5432/mail"
        );
    }

    struct TmpFile {
        path: std::path::PathBuf,
    }

    impl TmpFile {
        fn path(&self) -> &str {
            self.path.to_str().unwrap()
        }
        fn close(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn tempfile_with(contents: &str) -> TmpFile {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "mail-config-test-{}-{}.json",
            std::process::id(),
            n
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        TmpFile { path }
    }
}
