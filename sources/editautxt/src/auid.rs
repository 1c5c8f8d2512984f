//! Archival unit identifiers, and the reserved `au.txt` keys that mention them.
//!
//! An AUID is written `PLUGINID&AUKEY`. In `au.txt` the same unit appears inside a key such as
//! `org.lockss.au.org|example|plugin.pid%3D1.reserved.repository`, where the dots of the plugin
//! id have become `|` and the AU key is percent-encoded. Both spellings are reduced to one
//! canonical form before they are compared.

use crate::error::{self, Result};
use percent_encoding::percent_decode_str;
use snafu::{ensure, OptionExt};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Separates the plugin id from the AU key in the external AUID representation.
pub(crate) const AUID_DELIMITER: char = '&';

/// Every per-AU key in `au.txt` starts with this.
pub(crate) const AU_KEY_PREFIX: &str = "org.lockss.au.";

/// Marks the start of the reserved attribute in a per-AU key.
pub(crate) const RESERVED_MARKER: &str = ".reserved.";

/// A target archival unit.
///
/// Equality and hashing only look at the canonical plugin id and AU key; `text` keeps the
/// spelling the unit was given in so it can be reported back unchanged. The AU key is kept as
/// decoded bytes, since percent sequences need not decode to valid UTF-8.
#[derive(Debug, Clone)]
pub(crate) struct Auid {
    text: String,
    plugin_id: String,
    au_key: Vec<u8>,
}

impl Auid {
    fn from_parts(text: String, plugin_id: &str, au_key: &str) -> Self {
        Self {
            text,
            plugin_id: canonical_plugin_id(plugin_id),
            au_key: canonical_au_key(au_key),
        }
    }

    pub(crate) fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub(crate) fn au_key(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.au_key)
    }

    /// The AUID as it was originally spelled.
    #[cfg(test)]
    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for Auid {
    type Err = error::Error;

    fn from_str(input: &str) -> Result<Self> {
        let (plugin_id, au_key) = input
            .split_once(AUID_DELIMITER)
            .context(error::InvalidAuidSnafu { auid: input })?;
        ensure!(
            !plugin_id.is_empty() && !au_key.is_empty(),
            error::InvalidAuidSnafu { auid: input }
        );
        Ok(Self::from_parts(input.to_string(), plugin_id, au_key))
    }
}

impl PartialEq for Auid {
    fn eq(&self, other: &Self) -> bool {
        self.plugin_id == other.plugin_id && self.au_key == other.au_key
    }
}

impl Eq for Auid {}

impl Hash for Auid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.plugin_id.hash(state);
        self.au_key.hash(state);
    }
}

impl fmt::Display for Auid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

fn canonical_plugin_id(plugin_id: &str) -> String {
    plugin_id.replace('|', ".")
}

fn canonical_au_key(au_key: &str) -> Vec<u8> {
    percent_decode_str(au_key).collect()
}

/// The reserved attributes this tool knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reserved {
    /// The AU has no explicit repository; the daemon's default applies.
    Disabled,
    /// The AU's current repository.
    Repository,
}

impl Reserved {
    fn from_attribute(attribute: &str) -> Option<Self> {
        match attribute {
            "disabled" => Some(Reserved::Disabled),
            "repository" => Some(Reserved::Repository),
            _ => None,
        }
    }
}

/// Why a line that looked like a reserved key was not turned into a `ReservedEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Skip {
    /// Not a per-AU reserved key, or a reserved attribute we don't handle.
    NotReserved,
    /// The plugin segment contains the AUID delimiter, so the split would be ambiguous.
    AmbiguousPluginId,
}

/// The parts of an `org.lockss.au.<plugin>.<key>.reserved.<attribute>=<value>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReservedEntry<'a> {
    /// Everything before `.reserved.`, exactly as it appears in the file.
    pub(crate) key_prefix: &'a str,
    pub(crate) plugin_segment: &'a str,
    pub(crate) key_segment: &'a str,
    pub(crate) reserved: Reserved,
}

impl<'a> ReservedEntry<'a> {
    pub(crate) fn parse(line: &'a str) -> std::result::Result<Self, Skip> {
        // Property file comments
        if line.trim_start().starts_with(['#', '!']) {
            return Err(Skip::NotReserved);
        }
        let (key, _value) = line.split_once('=').ok_or(Skip::NotReserved)?;
        let start = key.find(AU_KEY_PREFIX).ok_or(Skip::NotReserved)?;
        let marker = key.rfind(RESERVED_MARKER).ok_or(Skip::NotReserved)?;
        let middle_start = start + AU_KEY_PREFIX.len();
        if marker < middle_start {
            return Err(Skip::NotReserved);
        }

        let reserved = Reserved::from_attribute(&key[marker + RESERVED_MARKER.len()..])
            .ok_or(Skip::NotReserved)?;
        let (plugin_segment, key_segment) = key[middle_start..marker]
            .split_once('.')
            .ok_or(Skip::NotReserved)?;
        if plugin_segment.is_empty() || key_segment.is_empty() {
            return Err(Skip::NotReserved);
        }
        if plugin_segment.contains(AUID_DELIMITER) {
            return Err(Skip::AmbiguousPluginId);
        }

        Ok(Self {
            key_prefix: &key[..marker],
            plugin_segment,
            key_segment,
            reserved,
        })
    }

    /// The AUID this key belongs to, in external `PLUGINID&AUKEY` form.
    pub(crate) fn auid(&self) -> Auid {
        let text = format!(
            "{}{}{}",
            canonical_plugin_id(self.plugin_segment),
            AUID_DELIMITER,
            self.key_segment
        );
        Auid::from_parts(text, self.plugin_segment, self.key_segment)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_auid() {
        let auid: Auid = "org.example.plugin&pid=1".parse().unwrap();
        assert_eq!(auid.plugin_id(), "org.example.plugin");
        assert_eq!(auid.au_key(), "pid=1");
        assert_eq!(auid.to_string(), "org.example.plugin&pid=1");
    }

    #[test]
    fn key_keeps_later_delimiters() {
        let auid: Auid = "org.example.plugin&a~1&b~2".parse().unwrap();
        assert_eq!(auid.au_key(), "a~1&b~2");
    }

    #[test]
    fn rejects_auid_without_delimiter() {
        for bad in &["org.example.plugin", "&pid=1", "org.example.plugin&"] {
            assert!(bad.parse::<Auid>().is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn dotted_and_piped_plugin_ids_match() {
        let dotted: Auid = "org.example.plugin&pid=1".parse().unwrap();
        let piped: Auid = "org|example|plugin&pid%3D1".parse().unwrap();
        assert_eq!(dotted, piped);
        // Still reported the way each was written
        assert_eq!(piped.as_str(), "org|example|plugin&pid%3D1");
    }

    #[test]
    fn undecodable_keys_stay_distinct() {
        let fe: Auid = "p&k%FE".parse().unwrap();
        let ff: Auid = "p&k%FF".parse().unwrap();
        assert_ne!(fe, ff);
        // Same bytes however the hex digits are written
        assert_eq!(fe, "p&k%fe".parse::<Auid>().unwrap());
    }

    #[test]
    fn parse_repository_entry() {
        let line = r"org.lockss.au.org|example|plugin.pid%3D1.reserved.repository=local\:/repo/A";
        let entry = ReservedEntry::parse(line).unwrap();
        assert_eq!(entry.key_prefix, "org.lockss.au.org|example|plugin.pid%3D1");
        assert_eq!(entry.plugin_segment, "org|example|plugin");
        assert_eq!(entry.key_segment, "pid%3D1");
        assert_eq!(entry.reserved, Reserved::Repository);
        assert_eq!(entry.auid(), "org.example.plugin&pid=1".parse::<Auid>().unwrap());
    }

    #[test]
    fn parse_disabled_entry() {
        let line = "org.lockss.au.org|example|plugin.pid%3D2.reserved.disabled=false";
        let entry = ReservedEntry::parse(line).unwrap();
        assert_eq!(entry.reserved, Reserved::Disabled);
        assert_eq!(entry.auid().as_str(), "org.example.plugin&pid%3D2");
    }

    #[test]
    fn key_segment_may_contain_dots() {
        let line = r"org.lockss.au.p.base_url~http%3A%2F%2Fexample.com%2F.reserved.repository=x";
        let entry = ReservedEntry::parse(line).unwrap();
        assert_eq!(entry.plugin_segment, "p");
        assert_eq!(entry.key_segment, "base_url~http%3A%2F%2Fexample.com%2F");
        assert_eq!(entry.auid().au_key(), "base_url~http://example.com/");
    }

    #[test]
    fn skips_unrelated_lines() {
        for line in &[
            "org.lockss.config.fileVersion.au=1",
            "# org.lockss.au.p.k.reserved.repository comment",
            r"#org.lockss.au.p.k.reserved.repository=local\:/repo/A",
            "org.lockss.au.p.k.reserved.wrapper=true",
            "org.lockss.au.pk.reserved.repository=x",
            "org.lockss.au.p.k.title=x.reserved.repository",
        ] {
            assert_eq!(ReservedEntry::parse(line), Err(Skip::NotReserved), "{}", line);
        }
    }

    #[test]
    fn ambiguous_plugin_id() {
        let line = "org.lockss.au.org|a&b.key.reserved.disabled=false";
        assert_eq!(ReservedEntry::parse(line), Err(Skip::AmbiguousPluginId));
    }
}
