//! Directory entries as returned by a lookup.

use ldap3::asn1::StructureTag;
use ldap3::ResultEntry;
use ldapweb_core::{Error, Result};
use serde::{Deserialize, Serialize};

// LDAP application tag of a SearchResultEntry.
const SEARCH_RESULT_ENTRY: u64 = 4;

/// One attribute of an entry with its values, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryAttribute {
    /// Attribute description as sent by the server.
    pub name: String,
    /// Values in the order the server sent them.
    pub values: Vec<String>,
}

/// LDAP entry with attributes kept in the order the server returned them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attributes in server order.
    pub attributes: Vec<DirectoryAttribute>,
}

impl DirectoryEntry {
    /// Returns all values for the attribute (case-insensitive name match).
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(attribute))
            .map(|attr| attr.values.as_slice())
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Decodes a raw search result entry without reordering anything.
    ///
    /// Values that are not valid UTF-8 are converted lossily.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationError`] if the entry is not a well-formed
    /// SearchResultEntry.
    pub fn from_result_entry(entry: ResultEntry) -> Result<Self> {
        Self::from_tag(entry.0)
    }

    pub(crate) fn from_tag(tag: StructureTag) -> Result<Self> {
        let mut parts = tag
            .match_id(SEARCH_RESULT_ENTRY)
            .and_then(StructureTag::expect_constructed)
            .ok_or_else(|| malformed("not a search result entry"))?
            .into_iter();

        let dn = parts
            .next()
            .and_then(StructureTag::expect_primitive)
            .map(lossy)
            .ok_or_else(|| malformed("missing entry DN"))?;

        let raw_attributes = parts
            .next()
            .and_then(StructureTag::expect_constructed)
            .ok_or_else(|| malformed("missing attribute list"))?;

        let attributes = raw_attributes
            .into_iter()
            .map(decode_attribute)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { dn, attributes })
    }
}

fn decode_attribute(tag: StructureTag) -> Result<DirectoryAttribute> {
    let mut parts = tag
        .expect_constructed()
        .ok_or_else(|| malformed("attribute is not a sequence"))?
        .into_iter();

    let name = parts
        .next()
        .and_then(StructureTag::expect_primitive)
        .map(lossy)
        .ok_or_else(|| malformed("missing attribute name"))?;

    let values = parts
        .next()
        .and_then(StructureTag::expect_constructed)
        .ok_or_else(|| malformed(format!("missing value set for `{name}`")))?
        .into_iter()
        .map(|value| {
            value
                .expect_primitive()
                .map(lossy)
                .ok_or_else(|| malformed(format!("non-primitive value for `{name}`")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DirectoryAttribute { name, values })
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::operation("search", format!("malformed search entry: {}", reason.into()))
}
