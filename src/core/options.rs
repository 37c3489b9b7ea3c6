//! Connection configuration
//!
//! [`ConnectOptions`] is what a host fills in (directly, through the builder
//! methods, or from JSON). [`ConnectOptions::build`] validates it and yields
//! the final connection string together with the [`Settings`] the engine
//! runs with.

use super::error::{DatabaseError, Result};
use super::types::{Charset, Timezone};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Statement run after connect when crash-fix mode is on
pub const CRASH_FIX_VARIABLE_SQL: &str = "CREATE VARIABLE @@sqlany_bridge_fix char(1)";

/// Prefix put in front of prepared and direct SQL in crash-fix mode
pub const CRASH_FIX_PREFIX: &str = "set @@sqlany_bridge_fix = ''; ";

/// Connection string key holding the character set
const CHARSET_KEY: &str = "CharSet";

/// Options a host supplies when opening a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// `key=value` pairs separated by `;`
    pub conn_string: String,
    /// Reinterpret values by their declared column type
    pub cast: bool,
    /// `local` or `utc`
    pub database_timezone: Option<String>,
    /// Used when the connection string carries no `CharSet`
    pub encoding: Option<String>,
    pub enable_crash_fix: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            conn_string: String::new(),
            cast: true,
            database_timezone: None,
            encoding: None,
            enable_crash_fix: false,
        }
    }
}

impl ConnectOptions {
    pub fn new<S: Into<String>>(conn_string: S) -> Self {
        Self {
            conn_string: conn_string.into(),
            ..Self::default()
        }
    }

    /// Load options from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DatabaseError::config(format!("Invalid connection options: {}", e)))
    }

    pub fn cast(mut self, cast: bool) -> Self {
        self.cast = cast;
        self
    }

    pub fn database_timezone<S: Into<String>>(mut self, timezone: S) -> Self {
        self.database_timezone = Some(timezone.into());
        self
    }

    pub fn encoding<S: Into<String>>(mut self, encoding: S) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn enable_crash_fix(mut self, enable: bool) -> Self {
        self.enable_crash_fix = enable;
        self
    }

    /// Validate the options and produce the final connection string
    ///
    /// The character set comes from the connection string's `CharSet` key
    /// if present, then from `encoding`, then defaults to UTF-8. The chosen
    /// name is written back into the connection string.
    pub fn build(&self) -> Result<(String, Settings)> {
        let mut conn = ConnectionString::parse(&self.conn_string);

        let charset_name = conn
            .get(CHARSET_KEY)
            .map(str::to_string)
            .or_else(|| self.encoding.clone());
        let charset = match charset_name {
            Some(name) => name.parse::<Charset>()?,
            None => Charset::default(),
        };
        conn.set(CHARSET_KEY, charset.name());

        let database_timezone = match &self.database_timezone {
            Some(tz) => tz.parse::<Timezone>()?,
            None => Timezone::default(),
        };

        let settings = Settings {
            cast: self.cast,
            database_timezone,
            charset,
            enable_crash_fix: self.enable_crash_fix,
        };
        Ok((conn.to_string(), settings))
    }
}

/// Validated per-connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub cast: bool,
    pub database_timezone: Timezone,
    pub charset: Charset,
    pub enable_crash_fix: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cast: true,
            database_timezone: Timezone::Local,
            charset: Charset::Utf8,
            enable_crash_fix: false,
        }
    }
}

impl Settings {
    /// SQL as it should be handed to prepare or execute-direct
    pub fn preprocess_sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if self.enable_crash_fix {
            Cow::Owned(format!("{}{}", CRASH_FIX_PREFIX, sql))
        } else {
            Cow::Borrowed(sql)
        }
    }
}

/// Reject SQL text the driver must never see
pub fn check_sql(sql: &str) -> Result<()> {
    if sql.is_empty() {
        return Err(DatabaseError::invalid_sql("SQL must not be empty"));
    }
    Ok(())
}

/// Ordered `key=value` pairs of a connection string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionString {
    pairs: Vec<(String, String)>,
}

impl ConnectionString {
    /// Split on `;`, then on the first `=`; empty segments are skipped
    pub fn parse(text: &str) -> Self {
        let pairs = text
            .split(';')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (segment.to_string(), String::new()),
            })
            .collect();
        Self { pairs }
    }

    /// Value for `key`, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value for `key` in place, or append it
    pub fn set<V: Into<String>>(&mut self, key: &str, value: V) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, v)) => *v = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONN: &str = "DatabaseName=test;UserID=dba;Password=sql";

    #[test]
    fn test_defaults() {
        let (conn, settings) = ConnectOptions::new(CONN).build().unwrap();
        assert_eq!(conn, format!("{};CharSet=UTF-8", CONN));
        assert_eq!(settings, Settings::default());
        assert!(settings.cast);
    }

    #[test]
    fn test_charset_precedence() {
        let (conn, settings) = ConnectOptions::new(format!("{};CharSet=UTF-8", CONN))
            .encoding("latin1")
            .build()
            .unwrap();
        assert_eq!(settings.charset, Charset::Utf8);
        assert_eq!(conn.matches("CharSet").count(), 1);

        let (conn, settings) = ConnectOptions::new(CONN).encoding("latin1").build().unwrap();
        assert_eq!(settings.charset, Charset::Latin1);
        assert!(conn.ends_with("CharSet=ISO-8859-1"));
    }

    #[test]
    fn test_unknown_encoding() {
        let result = ConnectOptions::new(CONN).encoding("ENC").build();
        assert!(matches!(result, Err(DatabaseError::Config(_))));
    }

    #[test]
    fn test_invalid_timezone() {
        let result = ConnectOptions::new(CONN).database_timezone("test").build();
        assert!(matches!(result, Err(DatabaseError::Config(_))));

        let (_, settings) = ConnectOptions::new(CONN)
            .database_timezone("utc")
            .build()
            .unwrap();
        assert_eq!(settings.database_timezone, Timezone::Utc);
    }

    #[test]
    fn test_from_json() {
        let opts = ConnectOptions::from_json(
            r#"{"conn_string": "ServerName=demo", "cast": false, "enable_crash_fix": true}"#,
        )
        .unwrap();
        assert_eq!(opts.conn_string, "ServerName=demo");
        assert!(!opts.cast);
        assert!(opts.enable_crash_fix);
        assert_eq!(opts.database_timezone, None);

        assert!(ConnectOptions::from_json("{").is_err());
    }

    #[test]
    fn test_connection_string_values_keep_equals() {
        let mut conn = ConnectionString::parse("Host=h;Password=a=b;;Flag");
        assert_eq!(conn.len(), 3);
        assert_eq!(conn.get("password"), Some("a=b"));
        assert_eq!(conn.get("Flag"), Some(""));

        conn.set("HOST", "other");
        assert_eq!(conn.to_string(), "Host=other;Password=a=b;Flag=");
    }

    #[test]
    fn test_crash_fix_prefix() {
        let settings = Settings {
            enable_crash_fix: true,
            ..Settings::default()
        };
        assert_eq!(
            settings.preprocess_sql("SELECT 1"),
            "set @@sqlany_bridge_fix = ''; SELECT 1"
        );
        assert_eq!(Settings::default().preprocess_sql("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_check_sql() {
        assert!(check_sql("SELECT 1").is_ok());
        assert!(matches!(check_sql(""), Err(DatabaseError::InvalidSql(_))));
    }
}
