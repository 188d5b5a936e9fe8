//! Output record kinds
//!
//! The closed set of local record kinds a mapping can target. Each kind
//! carries its content item type, its named columns and its named literal
//! constants as plain data, so mapping files are validated by table lookup.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Content item type of fallback rows holding unmapped attribute values.
pub const FALLBACK_CONTENT_TYPE: &str =
    "vnd.android.cursor.item/vnd.info.codethink.ldap.contactldifentry";

/// Fallback column holding the attribute name.
pub const FALLBACK_NAME_COLUMN: &str = "data1";

/// Fallback column holding the value index.
pub const FALLBACK_INDEX_COLUMN: &str = "data2";

/// Fallback column holding the raw value.
pub const FALLBACK_DATA_COLUMN: &str = "data15";

/// Symbolic name of the constant holding a kind's content item type.
const CONTENT_ITEM_TYPE: &str = "CONTENT_ITEM_TYPE";

type Table = &'static [(&'static str, &'static str)];

/// A local record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    StructuredName,
    Phone,
    Email,
    StructuredPostal,
    Organization,
    Nickname,
    Note,
    Website,
    Photo,
    Im,
    SipAddress,
    Event,
    Relation,
    Identity,
}

impl RecordKind {
    /// Every known kind.
    pub const ALL: [RecordKind; 14] = [
        RecordKind::StructuredName,
        RecordKind::Phone,
        RecordKind::Email,
        RecordKind::StructuredPostal,
        RecordKind::Organization,
        RecordKind::Nickname,
        RecordKind::Note,
        RecordKind::Website,
        RecordKind::Photo,
        RecordKind::Im,
        RecordKind::SipAddress,
        RecordKind::Event,
        RecordKind::Relation,
        RecordKind::Identity,
    ];

    /// Name used in mapping files.
    pub fn name(self) -> &'static str {
        match self {
            RecordKind::StructuredName => "StructuredName",
            RecordKind::Phone => "Phone",
            RecordKind::Email => "Email",
            RecordKind::StructuredPostal => "StructuredPostal",
            RecordKind::Organization => "Organization",
            RecordKind::Nickname => "Nickname",
            RecordKind::Note => "Note",
            RecordKind::Website => "Website",
            RecordKind::Photo => "Photo",
            RecordKind::Im => "Im",
            RecordKind::SipAddress => "SipAddress",
            RecordKind::Event => "Event",
            RecordKind::Relation => "Relation",
            RecordKind::Identity => "Identity",
        }
    }

    /// Content item type stamped on every row of this kind.
    pub fn content_item_type(self) -> &'static str {
        match self {
            RecordKind::StructuredName => "vnd.android.cursor.item/name",
            RecordKind::Phone => "vnd.android.cursor.item/phone_v2",
            RecordKind::Email => "vnd.android.cursor.item/email_v2",
            RecordKind::StructuredPostal => "vnd.android.cursor.item/postal-address_v2",
            RecordKind::Organization => "vnd.android.cursor.item/organization",
            RecordKind::Nickname => "vnd.android.cursor.item/nickname",
            RecordKind::Note => "vnd.android.cursor.item/note",
            RecordKind::Website => "vnd.android.cursor.item/website",
            RecordKind::Photo => "vnd.android.cursor.item/photo",
            RecordKind::Im => "vnd.android.cursor.item/im",
            RecordKind::SipAddress => "vnd.android.cursor.item/sip_address",
            RecordKind::Event => "vnd.android.cursor.item/contact_event",
            RecordKind::Relation => "vnd.android.cursor.item/relation",
            RecordKind::Identity => "vnd.android.cursor.item/identity",
        }
    }

    /// Symbolic column names and the storage columns they resolve to.
    pub fn columns(self) -> Table {
        match self {
            RecordKind::StructuredName => &[
                ("DISPLAY_NAME", "data1"),
                ("GIVEN_NAME", "data2"),
                ("FAMILY_NAME", "data3"),
                ("PREFIX", "data4"),
                ("MIDDLE_NAME", "data5"),
                ("SUFFIX", "data6"),
                ("PHONETIC_GIVEN_NAME", "data7"),
                ("PHONETIC_MIDDLE_NAME", "data8"),
                ("PHONETIC_FAMILY_NAME", "data9"),
            ],
            RecordKind::Phone => &[
                ("DATA", "data1"),
                ("NUMBER", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
                ("NORMALIZED_NUMBER", "data4"),
            ],
            RecordKind::Email => &[
                ("DATA", "data1"),
                ("ADDRESS", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
                ("DISPLAY_NAME", "data4"),
            ],
            RecordKind::StructuredPostal => &[
                ("DATA", "data1"),
                ("FORMATTED_ADDRESS", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
                ("STREET", "data4"),
                ("POBOX", "data5"),
                ("NEIGHBORHOOD", "data6"),
                ("CITY", "data7"),
                ("REGION", "data8"),
                ("POSTCODE", "data9"),
                ("COUNTRY", "data10"),
            ],
            RecordKind::Organization => &[
                ("DATA", "data1"),
                ("COMPANY", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
                ("TITLE", "data4"),
                ("DEPARTMENT", "data5"),
                ("JOB_DESCRIPTION", "data6"),
                ("SYMBOL", "data7"),
                ("PHONETIC_NAME", "data8"),
                ("OFFICE_LOCATION", "data9"),
            ],
            RecordKind::Nickname => &[
                ("DATA", "data1"),
                ("NAME", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
            ],
            RecordKind::Note => &[("NOTE", "data1")],
            RecordKind::Website => &[
                ("DATA", "data1"),
                ("URL", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
            ],
            RecordKind::Photo => &[("PHOTO_FILE_ID", "data14"), ("PHOTO", "data15")],
            RecordKind::Im => &[
                ("DATA", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
                ("PROTOCOL", "data5"),
                ("CUSTOM_PROTOCOL", "data6"),
            ],
            RecordKind::SipAddress => &[
                ("DATA", "data1"),
                ("SIP_ADDRESS", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
            ],
            RecordKind::Event => &[
                ("DATA", "data1"),
                ("START_DATE", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
            ],
            RecordKind::Relation => &[
                ("DATA", "data1"),
                ("NAME", "data1"),
                ("TYPE", "data2"),
                ("LABEL", "data3"),
            ],
            RecordKind::Identity => &[("IDENTITY", "data1"), ("NAMESPACE", "data2")],
        }
    }

    /// Named literal constants usable with `typeattr`.
    ///
    /// `CONTENT_ITEM_TYPE` is available on every kind in addition to these.
    pub fn constants(self) -> Table {
        match self {
            RecordKind::Phone => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_HOME", "1"),
                ("TYPE_MOBILE", "2"),
                ("TYPE_WORK", "3"),
                ("TYPE_FAX_WORK", "4"),
                ("TYPE_FAX_HOME", "5"),
                ("TYPE_PAGER", "6"),
                ("TYPE_OTHER", "7"),
                ("TYPE_CALLBACK", "8"),
                ("TYPE_CAR", "9"),
                ("TYPE_COMPANY_MAIN", "10"),
                ("TYPE_ISDN", "11"),
                ("TYPE_MAIN", "12"),
                ("TYPE_OTHER_FAX", "13"),
                ("TYPE_RADIO", "14"),
                ("TYPE_TELEX", "15"),
                ("TYPE_TTY_TDD", "16"),
                ("TYPE_WORK_MOBILE", "17"),
                ("TYPE_WORK_PAGER", "18"),
                ("TYPE_ASSISTANT", "19"),
                ("TYPE_MMS", "20"),
            ],
            RecordKind::Email => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_HOME", "1"),
                ("TYPE_WORK", "2"),
                ("TYPE_OTHER", "3"),
                ("TYPE_MOBILE", "4"),
            ],
            RecordKind::StructuredPostal => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_HOME", "1"),
                ("TYPE_WORK", "2"),
                ("TYPE_OTHER", "3"),
            ],
            RecordKind::Organization => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_WORK", "1"),
                ("TYPE_OTHER", "2"),
            ],
            RecordKind::Nickname => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_DEFAULT", "1"),
                ("TYPE_OTHER_NAME", "2"),
                ("TYPE_MAINDEN_NAME", "3"),
                ("TYPE_MAIDEN_NAME", "3"),
                ("TYPE_SHORT_NAME", "4"),
                ("TYPE_INITIALS", "5"),
            ],
            RecordKind::Website => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_HOMEPAGE", "1"),
                ("TYPE_BLOG", "2"),
                ("TYPE_PROFILE", "3"),
                ("TYPE_HOME", "4"),
                ("TYPE_WORK", "5"),
                ("TYPE_FTP", "6"),
                ("TYPE_OTHER", "7"),
            ],
            RecordKind::Im => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_HOME", "1"),
                ("TYPE_WORK", "2"),
                ("TYPE_OTHER", "3"),
                ("PROTOCOL_CUSTOM", "-1"),
                ("PROTOCOL_AIM", "0"),
                ("PROTOCOL_MSN", "1"),
                ("PROTOCOL_YAHOO", "2"),
                ("PROTOCOL_SKYPE", "3"),
                ("PROTOCOL_QQ", "4"),
                ("PROTOCOL_GOOGLE_TALK", "5"),
                ("PROTOCOL_ICQ", "6"),
                ("PROTOCOL_JABBER", "7"),
                ("PROTOCOL_NETMEETING", "8"),
            ],
            RecordKind::SipAddress => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_HOME", "1"),
                ("TYPE_WORK", "2"),
                ("TYPE_OTHER", "3"),
            ],
            RecordKind::Event => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_ANNIVERSARY", "1"),
                ("TYPE_OTHER", "2"),
                ("TYPE_BIRTHDAY", "3"),
            ],
            RecordKind::Relation => &[
                ("TYPE_CUSTOM", "0"),
                ("TYPE_ASSISTANT", "1"),
                ("TYPE_BROTHER", "2"),
                ("TYPE_CHILD", "3"),
                ("TYPE_DOMESTIC_PARTNER", "4"),
                ("TYPE_FATHER", "5"),
                ("TYPE_FRIEND", "6"),
                ("TYPE_MANAGER", "7"),
                ("TYPE_MOTHER", "8"),
                ("TYPE_PARENT", "9"),
                ("TYPE_PARTNER", "10"),
                ("TYPE_REFERRED_BY", "11"),
                ("TYPE_RELATIVE", "12"),
                ("TYPE_SISTER", "13"),
                ("TYPE_SPOUSE", "14"),
            ],
            RecordKind::StructuredName
            | RecordKind::Note
            | RecordKind::Photo
            | RecordKind::Identity => &[],
        }
    }

    /// Resolve a symbolic column name to its storage column.
    pub fn column(self, name: &str) -> Option<&'static str> {
        lookup(self.columns(), name)
    }

    /// Resolve a symbolic constant name to its literal value.
    pub fn constant(self, name: &str) -> Option<&'static str> {
        if name == CONTENT_ITEM_TYPE {
            return Some(self.content_item_type());
        }
        lookup(self.constants(), name)
    }

    /// Find the kind whose rows carry the given content item type.
    pub fn from_content_item_type(content_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.content_item_type() == content_type)
    }
}

fn lookup(table: Table, name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(symbol, _)| *symbol == name)
        .map(|(_, value)| *value)
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown record kind: {s}"))
    }
}
