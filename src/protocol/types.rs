//! Common PostgreSQL wire protocol types.

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

/// OIDs of built-in PostgreSQL types.
///
/// This table mirrors the server catalog (`pg_type`) and is a fixed public
/// contract: the integers must match the target database exactly. Extension
/// types such as hstore have installation-assigned oids and are not listed.
pub mod oid {
    use super::Oid;

    /// bool
    pub const BOOL: Oid = 16;
    /// bytea
    pub const BYTEA: Oid = 17;
    /// "char" (single byte)
    pub const CHAR: Oid = 18;
    /// name
    pub const NAME: Oid = 19;
    /// int8
    pub const INT8: Oid = 20;
    /// int2
    pub const INT2: Oid = 21;
    /// int4
    pub const INT4: Oid = 23;
    /// text
    pub const TEXT: Oid = 25;
    /// oid
    pub const OID: Oid = 26;
    /// tid
    pub const TID: Oid = 27;
    /// xid
    pub const XID: Oid = 28;
    /// cid
    pub const CID: Oid = 29;
    /// json
    pub const JSON: Oid = 114;
    /// cidr
    pub const CIDR: Oid = 650;
    /// cidr[]
    pub const CIDR_ARRAY: Oid = 651;
    /// float4
    pub const FLOAT4: Oid = 700;
    /// float8
    pub const FLOAT8: Oid = 701;
    /// unknown
    pub const UNKNOWN: Oid = 705;
    /// inet
    pub const INET: Oid = 869;
    /// bool[]
    pub const BOOL_ARRAY: Oid = 1000;
    /// bytea[]
    pub const BYTEA_ARRAY: Oid = 1001;
    /// int2[]
    pub const INT2_ARRAY: Oid = 1005;
    /// int4[]
    pub const INT4_ARRAY: Oid = 1007;
    /// text[]
    pub const TEXT_ARRAY: Oid = 1009;
    /// varchar[]
    pub const VARCHAR_ARRAY: Oid = 1015;
    /// int8[]
    pub const INT8_ARRAY: Oid = 1016;
    /// float4[]
    pub const FLOAT4_ARRAY: Oid = 1021;
    /// float8[]
    pub const FLOAT8_ARRAY: Oid = 1022;
    /// aclitem
    pub const ACLITEM: Oid = 1033;
    /// aclitem[]
    pub const ACLITEM_ARRAY: Oid = 1034;
    /// inet[]
    pub const INET_ARRAY: Oid = 1041;
    /// varchar
    pub const VARCHAR: Oid = 1043;
    /// date
    pub const DATE: Oid = 1082;
    /// timestamp
    pub const TIMESTAMP: Oid = 1114;
    /// timestamp[]
    pub const TIMESTAMP_ARRAY: Oid = 1115;
    /// date[]
    pub const DATE_ARRAY: Oid = 1182;
    /// timestamptz
    pub const TIMESTAMPTZ: Oid = 1184;
    /// timestamptz[]
    pub const TIMESTAMPTZ_ARRAY: Oid = 1185;
    /// record
    pub const RECORD: Oid = 2249;
    /// uuid
    pub const UUID: Oid = 2950;
    /// jsonb
    pub const JSONB: Oid = 3802;
}

/// Data format code in PostgreSQL protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum FormatCode {
    /// Text format (human-readable)
    #[default]
    Text = 0,
    /// Binary format (type-specific packed representation)
    Binary = 1,
}

impl FormatCode {
    /// Create a FormatCode from a raw u16 value.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => FormatCode::Binary,
            _ => FormatCode::Text,
        }
    }
}

impl From<u16> for FormatCode {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

/// Transaction status indicator from ReadyForQuery message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Idle (not in transaction block)
    #[default]
    Idle = b'I',
    /// In transaction block
    InTransaction = b'T',
    /// In failed transaction block (queries will be rejected until rollback)
    Failed = b'E',
}

impl TransactionStatus {
    /// Create a TransactionStatus from a raw byte value.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Returns true if currently in a transaction (either active or failed).
    pub fn in_transaction(self) -> bool {
        matches!(self, TransactionStatus::InTransaction | TransactionStatus::Failed)
    }

    /// Returns true if the transaction has failed.
    pub fn is_failed(self) -> bool {
        matches!(self, TransactionStatus::Failed)
    }
}
