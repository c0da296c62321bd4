use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use bon::Builder;
use const_oid::ObjectIdentifier;
use der::Any;
use der::asn1::{Ia5StringRef, PrintableStringRef, SetOfVec, Utf8StringRef};
use regex::Regex;
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use super::extensions::{AltName, ToAndFromX509Extension};
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::{CertFactoryError, Result};

/// Parameters for building an X.509 certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `usages` - A list of extended key usage options.
/// * `alt_names` - DNS names and IP addresses for the subject alternative name extension.
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: DistinguishedName,
    pub subject_public_key: SubjectPublicKeyInfoOwned,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub alt_names: Vec<AltName>,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

// Matches one comma-free segment; quoted spans and backslash escapes may contain commas.
static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:(?s:\\.)|[^,"'\\]|"[^"]*"|'[^']*')+"#).expect("invalid DN segment regex")
});

const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const OID_O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_L: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_ST: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_EMAIL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// Distinguished name of a certificate subject or issuer.
///
/// Only the common name is required; every other field is an empty string
/// when absent. Fields are serialized in the fixed order
/// `CN, OU, O, L, ST, C, emailAddress`.
///
/// ```
/// use certfactory::cert::params::DistinguishedName;
///
/// let dn: DistinguishedName = r#"CN=Test,OU=Ice,O="ZeroC, Inc.""#.parse().unwrap();
/// assert_eq!(dn.organization, "ZeroC, Inc.");
/// assert_eq!(dn.to_string(), r"CN=Test,OU=Ice,O=ZeroC\, Inc.");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Builder)]
pub struct DistinguishedName {
    #[builder(into)]
    pub common_name: String,
    #[builder(into, default)]
    pub organization_unit: String,
    #[builder(into, default)]
    pub organization: String,
    #[builder(into, default)]
    pub locality: String,
    #[builder(into, default)]
    pub state: String,
    #[builder(into, default)]
    pub country: String,
    #[builder(into, default)]
    pub email_address: String,
}

impl DistinguishedName {
    /// Creates a name holding only a common name.
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    /// Fills every empty field except the common name from `default`.
    pub fn with_defaults(mut self, default: &DistinguishedName) -> Self {
        let inherit = |field: &mut String, fallback: &String| {
            if field.is_empty() {
                field.clone_from(fallback);
            }
        };
        inherit(&mut self.organization_unit, &default.organization_unit);
        inherit(&mut self.organization, &default.organization);
        inherit(&mut self.locality, &default.locality);
        inherit(&mut self.state, &default.state);
        inherit(&mut self.country, &default.country);
        inherit(&mut self.email_address, &default.email_address);
        self
    }

    /// Parses `KEY=value` pairs separated by commas.
    ///
    /// Commas inside single or double quotes, or escaped with a backslash, do
    /// not split. Keys are case-insensitive. One layer of surrounding double
    /// quotes is stripped from a value; unquoted values are unescaped.
    /// Whitespace around a value is dropped unless it is escaped.
    ///
    /// # Arguments
    ///
    /// * `text` - The distinguished name, e.g. `CN=Server,O="Acme, Inc."`.
    ///
    /// # Returns
    ///
    /// The parsed name, or `InvalidDistinguishedName` when the common name is
    /// missing or an attribute is unknown.
    pub fn parse(text: &str) -> Result<Self> {
        let mut common_name = None;
        let mut dn = DistinguishedName::default();
        for segment in SEGMENT.find_iter(text) {
            let segment = segment.as_str();
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let value = value.trim_start();
            let value = match value
                .trim_end()
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
            {
                Some(quoted) => quoted.to_string(),
                None => unescape(value),
            };
            match key.trim().to_uppercase().as_str() {
                "CN" => common_name = Some(value),
                "OU" => dn.organization_unit = value,
                "O" => dn.organization = value,
                "L" => dn.locality = value,
                "ST" => dn.state = value,
                "C" => dn.country = value,
                "EMAILADDRESS" => dn.email_address = value,
                other => {
                    return Err(CertFactoryError::InvalidDistinguishedName(format!(
                        "unknown attribute `{other}` in `{text}`"
                    )));
                }
            }
        }
        dn.common_name = common_name.ok_or_else(|| {
            CertFactoryError::InvalidDistinguishedName(format!("missing CN in `{text}`"))
        })?;
        Ok(dn)
    }

    /// Parses `text` and fills its missing fields from `default`.
    pub fn parse_with_defaults(text: &str, default: &DistinguishedName) -> Result<Self> {
        Ok(Self::parse(text)?.with_defaults(default))
    }

    /// Iterates over the present fields as `(key, value)` in serialization order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("CN", self.common_name.as_str()),
            ("OU", self.organization_unit.as_str()),
            ("O", self.organization.as_str()),
            ("L", self.locality.as_str()),
            ("ST", self.state.as_str()),
            ("C", self.country.as_str()),
            ("emailAddress", self.email_address.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
    }

    /// Serializes the present fields joined by `separator`.
    ///
    /// Occurrences of `separator` in a value are escaped with a backslash, as
    /// are backslashes and quote characters so that [`Self::parse`] restores
    /// the original value.
    pub fn to_string_with_separator(&self, separator: &str) -> String {
        self.fields()
            .map(|(key, value)| format!("{key}={}", escape(value, separator)))
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Converts the distinguished name to an X.509 `Name`.
    ///
    /// The RDN sequence is written most significant component first, so the
    /// country comes first and the common name last.
    pub fn as_x509_name(&self) -> Result<Name> {
        let mut rdns = Vec::new();
        for (key, value) in self.fields().collect::<Vec<_>>().into_iter().rev() {
            let (oid, value) = match key {
                "CN" => (OID_CN, Any::encode_from(&Utf8StringRef::new(value)?)?),
                "OU" => (OID_OU, Any::encode_from(&Utf8StringRef::new(value)?)?),
                "O" => (OID_O, Any::encode_from(&Utf8StringRef::new(value)?)?),
                "L" => (OID_L, Any::encode_from(&Utf8StringRef::new(value)?)?),
                "ST" => (OID_ST, Any::encode_from(&Utf8StringRef::new(value)?)?),
                "C" => (OID_C, Any::encode_from(&PrintableStringRef::new(value)?)?),
                _ => (OID_EMAIL, Any::encode_from(&Ia5StringRef::new(value)?)?),
            };
            let attribute = AttributeTypeAndValue { oid, value };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![
                attribute,
            ])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 `Name`.
    ///
    /// Attributes other than the seven supported ones are ignored.
    pub fn from_x509_name(x509dn: &Name) -> Result<Self> {
        let mut dn = DistinguishedName::default();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let value = std::str::from_utf8(attr.value.value())
                    .map_err(|e| CertFactoryError::DecodingError(e.to_string()))?
                    .to_string();
                match attr.oid {
                    OID_CN => dn.common_name = value,
                    OID_OU => dn.organization_unit = value,
                    OID_O => dn.organization = value,
                    OID_L => dn.locality = value,
                    OID_ST => dn.state = value,
                    OID_C => dn.country = value,
                    OID_EMAIL => dn.email_address = value,
                    _ => {}
                }
            }
        }
        Ok(dn)
    }
}

/// Escapes `separator`, quotes, backslashes and commas, plus whitespace at
/// either end of `value` so that it survives trimming.
fn escape(value: &str, separator: &str) -> String {
    let last = value.char_indices().next_back().map(|(i, _)| i);
    let mut escaped = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(c) = rest.chars().next() {
        if !separator.is_empty() && rest.starts_with(separator) {
            escaped.push('\\');
            escaped.push_str(separator);
            rest = &rest[separator.len()..];
            continue;
        }
        let at = value.len() - rest.len();
        let edge = at == 0 || Some(at) == last;
        if matches!(c, '\\' | '"' | '\'' | ',') || (edge && c.is_whitespace()) {
            escaped.push('\\');
        }
        escaped.push(c);
        rest = &rest[c.len_utf8()..];
    }
    escaped
}

/// Resolves backslash escapes and drops trailing whitespace that is not
/// escaped. Leading whitespace is expected to be trimmed already.
fn unescape(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut keep = 0;
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        let (c, escaped) = match c {
            '\\' => (chars.next().unwrap_or('\\'), true),
            c => (c, false),
        };
        unescaped.push(c);
        if escaped || !c.is_whitespace() {
            keep = unescaped.len();
        }
    }
    unescaped.truncate(keep);
    unescaped
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with_separator(","))
    }
}

impl FromStr for DistinguishedName {
    type Err = CertFactoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> DistinguishedName {
        DistinguishedName::builder()
            .common_name("Test")
            .organization_unit("Ice")
            .organization("ZeroC, Inc.")
            .locality("Jupiter")
            .state("Florida")
            .country("US")
            .email_address("info@zeroc.com")
            .build()
    }

    #[test]
    fn quoted_value_keeps_its_comma() {
        let dn = DistinguishedName::parse(r#"CN=Test,OU=Ice,O="ZeroC, Inc.""#).unwrap();
        assert_eq!(dn.common_name, "Test");
        assert_eq!(dn.organization_unit, "Ice");
        assert_eq!(dn.organization, "ZeroC, Inc.");
        assert_eq!(dn.to_string(), r"CN=Test,OU=Ice,O=ZeroC\, Inc.");
    }

    #[test]
    fn single_quotes_protect_commas_but_are_kept() {
        let dn = DistinguishedName::parse("CN=a, O='x, y'").unwrap();
        assert_eq!(dn.organization, "'x, y'");
    }

    #[test]
    fn serialize_then_parse_restores_every_field() {
        let dn = full();
        assert_eq!(DistinguishedName::parse(&dn.to_string()).unwrap(), dn);

        let odd = DistinguishedName::builder()
            .common_name(r#"back\slash "quoted" it's"#)
            .organization("a,b,,c")
            .build();
        assert_eq!(DistinguishedName::parse(&odd.to_string()).unwrap(), odd);
    }

    #[test]
    fn serialize_then_parse_keeps_awkward_values() {
        let values = [
            " padded ",
            "Acme ",
            " leading",
            " ",
            "   ",
            "\ttab\t",
            "line\nbreak\n",
            "\u{2003}em space\u{2003}",
            "trailing backslash\\",
            "\\",
            "a=b=c",
            "\"",
            "\"quoted\"",
            "'single'",
            "it's, \"mixed\" \\ all",
            ",",
            " , ",
            "Zürich",
            "東京 ",
            "plain",
        ];
        for value in values {
            let dn = DistinguishedName::builder()
                .common_name(value)
                .organization(value)
                .email_address(value)
                .build();
            let text = dn.to_string();
            assert_eq!(
                DistinguishedName::parse(&text).unwrap(),
                dn,
                "{value:?} serialized as {text:?}"
            );
        }
    }

    #[test]
    fn unescaped_surrounding_whitespace_is_dropped() {
        let dn = DistinguishedName::parse(r"CN= padded ,O=Acme\ ,OU=\ x").unwrap();
        assert_eq!(dn.common_name, "padded");
        assert_eq!(dn.organization, "Acme ");
        assert_eq!(dn.organization_unit, " x");
        assert_eq!(
            DistinguishedName::new(" padded ").to_string(),
            r"CN=\ padded\ "
        );
    }

    #[test]
    fn keys_are_case_insensitive() {
        let dn = DistinguishedName::parse(" cn = Server , emailaddress = a@b.c ,st=FL").unwrap();
        assert_eq!(dn.common_name, "Server");
        assert_eq!(dn.email_address, "a@b.c");
        assert_eq!(dn.state, "FL");
        assert_eq!(dn.to_string(), "CN=Server,ST=FL,emailAddress=a@b.c");
    }

    #[test]
    fn missing_common_name_is_rejected() {
        assert!(matches!(
            DistinguishedName::parse("O=Acme,C=US"),
            Err(CertFactoryError::InvalidDistinguishedName(_))
        ));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        assert!(matches!(
            DistinguishedName::parse("CN=a,DC=example"),
            Err(CertFactoryError::InvalidDistinguishedName(_))
        ));
    }

    #[test]
    fn defaults_fill_everything_but_the_common_name() {
        let ca = full();
        let dn = DistinguishedName::new("Server").with_defaults(&ca);
        assert_eq!(dn.common_name, "Server");
        assert_eq!(dn.organization_unit, ca.organization_unit);
        assert_eq!(dn.organization, ca.organization);
        assert_eq!(dn.locality, ca.locality);
        assert_eq!(dn.state, ca.state);
        assert_eq!(dn.country, ca.country);
        assert_eq!(dn.email_address, ca.email_address);

        let explicit = DistinguishedName::parse_with_defaults("CN=Client,O=Other", &ca).unwrap();
        assert_eq!(explicit.organization, "Other");
        assert_eq!(explicit.country, "US");
    }

    #[test]
    fn custom_separator_is_escaped() {
        let dn = DistinguishedName::builder()
            .common_name("a/b")
            .organization("Acme")
            .build();
        assert_eq!(dn.to_string_with_separator("/"), r"CN=a\/b/O=Acme");
    }

    #[test]
    fn x509_name_round_trip_skips_empty_fields() {
        let dn = full();
        let name = dn.as_x509_name().unwrap();
        assert_eq!(name.0.len(), 7);
        assert_eq!(DistinguishedName::from_x509_name(&name).unwrap(), dn);

        let short = DistinguishedName::new("only");
        assert_eq!(short.as_x509_name().unwrap().0.len(), 1);
    }
}
