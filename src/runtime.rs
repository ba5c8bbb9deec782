//! Runtime support for generated code
//!
//! Generated handlers are written against the small vocabulary in this
//! module: a [`Session`] that stores and loads [`Record`]s, a request
//! [`Context`] carrying the tenant, a [`Hooks`] registry for custom logic
//! around each operation, and the conversion helpers used by `from_pb` and
//! `to_pb`. The module path is configurable with the `runtime=` plugin
//! parameter, so a project can supply its own implementation.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub use chrono::{DateTime, Utc};
pub use serde_json::Value as JsonValue;
pub use uuid::Uuid;

/// Errors returned by generated handlers
#[derive(Error, Debug)]
pub enum Error {
    /// The primary key of the request is zero or empty
    #[error("primary key must not be empty")]
    EmptyId,

    /// A multi-account operation ran without an account id
    #[error("account id is missing from the request context")]
    MissingAccountId,

    /// A required argument was absent
    #[error("nil argument")]
    NilArgument,

    /// Arguments that must line up do not
    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// No record matched the query
    #[error("record not found")]
    NotFound,

    /// A value could not be converted between message and record
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// A registered hook failed
    #[error("hook failed: {0}")]
    Hook(String),

    /// Error reported by the storage layer, surfaced as-is
    #[error(transparent)]
    Storage(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Request scoped values handlers need
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    account_id: Option<String>,
}

impl Context {
    /// A context with no tenant
    pub fn new() -> Self {
        Self::default()
    }

    /// A context scoped to one account
    pub fn with_account_id(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
        }
    }

    /// The account id, which must be present and non-empty
    pub fn account_id(&self) -> Result<&str, Error> {
        match self.account_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(Error::MissingAccountId),
        }
    }
}

/// Static description of one storage column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: &'static str,
    /// Record field holding the value
    pub field: &'static str,
    /// Part of the primary key
    pub primary_key: bool,
    /// Rejects null
    pub not_null: bool,
    /// Carries a unique constraint
    pub unique: bool,
    /// Assigned by the database on insert
    pub auto_increment: bool,
    /// Explicit database type
    pub column_type: Option<&'static str>,
    /// Column size, for sized types
    pub size: Option<i32>,
    /// Default value expression
    pub default: Option<&'static str>,
}

/// Kind of association between two records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// The target holds a key referencing this record
    HasOne,
    /// Many targets hold a key referencing this record
    HasMany,
    /// This record holds a key referencing the target
    BelongsTo,
    /// Linked through a join table
    ManyToMany,
}

/// Join table of a many-to-many association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTableMeta {
    /// Join table name
    pub table: &'static str,
    /// Column referencing the owner
    pub foreign_key: &'static str,
    /// Column referencing the target
    pub association_foreign_key: &'static str,
}

/// Static description of one association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationMeta {
    /// Association kind
    pub kind: AssociationKind,
    /// Record field holding the associated records
    pub field: &'static str,
    /// Table of the associated record
    pub target_table: &'static str,
    /// Column holding the reference
    pub foreign_key: &'static str,
    /// Column the reference points at
    pub association_key: &'static str,
    /// Position column of an ordered has-many
    pub position_field: Option<&'static str>,
    /// Join table of a many-to-many
    pub join: Option<JoinTableMeta>,
    /// Load with the owner by default
    pub preload: bool,
    /// Saving the owner replaces stored targets
    pub replace: bool,
    /// Saving the owner appends to stored targets
    pub append: bool,
    /// Saving the owner clears stored targets first
    pub clear: bool,
}

/// A storage record
pub trait Record: Default + Clone + Send + Sync + 'static {
    /// Table the record is stored in
    const TABLE: &'static str;

    /// Columns in declaration order
    fn columns() -> &'static [Column];

    /// Associations in declaration order
    fn associations() -> &'static [AssociationMeta];

    /// Look up a column by record field name
    fn column(field: &str) -> Option<&'static Column> {
        Self::columns().iter().find(|c| c.field == field)
    }
}

/// Sort order on one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column name
    pub column: String,
    /// Sort high to low
    pub descending: bool,
}

impl Order {
    /// Ascending on a column
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Descending on a column
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} desc", self.column)
        } else {
            f.write_str(&self.column)
        }
    }
}

/// Parse a comma separated ordering such as `"name, created_at desc"`
///
/// Each entry is a column optionally followed by `asc` or `desc`.
pub fn parse_order_by(ordering: &str) -> Result<Vec<Order>, Error> {
    let mut orders = Vec::new();
    for entry in ordering.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut words = entry.split_whitespace();
        let column = words.next().unwrap_or(entry);
        let order = match words.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => Order::asc(column),
            Some("desc") => Order::desc(column),
            Some(other) => {
                return Err(Error::Conversion(format!(
                    "invalid sort direction {other:?} in {entry:?}"
                )))
            }
        };
        if words.next().is_some() {
            return Err(Error::Conversion(format!("invalid ordering {entry:?}")));
        }
        orders.push(order);
    }
    Ok(orders)
}

/// Filtering, sorting, paging and field selection supplied by the caller
///
/// Handlers pass these through to the session untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Filter expression, in whatever language the session understands
    pub filter: Option<String>,
    /// Requested ordering, outermost first
    pub order_by: Vec<Order>,
    /// Maximum number of rows
    pub limit: Option<u64>,
    /// Rows to skip
    pub offset: Option<u64>,
    /// Fields to select, empty for all
    pub fields: Vec<String>,
}

impl ListOptions {
    /// Whether the caller asked for an ordering
    pub fn has_order(&self) -> bool {
        !self.order_by.is_empty()
    }
}

/// Query by example
#[derive(Debug, Clone, PartialEq)]
pub struct Query<R> {
    /// Non-zero fields of the filter record must match
    pub filter: R,
    /// Load associated records as well
    pub preload: bool,
    /// Ordering of the records themselves
    pub order: Vec<Order>,
    /// Ordering of preloaded associations, keyed by association field
    pub association_order: Vec<(&'static str, Order)>,
    /// Caller-supplied list options
    pub options: Option<ListOptions>,
}

impl<R: Record> Query<R> {
    /// A query matching `filter`
    pub fn new(filter: R) -> Self {
        Self {
            filter,
            preload: false,
            order: Vec::new(),
            association_order: Vec::new(),
            options: None,
        }
    }

    /// Load associated records as well
    pub fn preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    /// Append an ordering
    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    /// Order the preloaded records of one association
    pub fn order_association(mut self, field: &'static str, order: Order) -> Self {
        self.association_order.push((field, order));
        self
    }

    /// Pass caller options through to the session
    pub fn with_options(mut self, options: ListOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Storage handle used by generated handlers
///
/// Implementations wrap a transaction of the underlying mapping library.
/// Every method reports storage failures as [`Error::Storage`].
pub trait Session {
    /// Insert a record, filling in generated values
    fn create<R: Record>(&mut self, record: &mut R) -> Result<(), Error>;

    /// Insert or update a record and its loaded associations
    fn save<R: Record>(&mut self, record: &mut R) -> Result<(), Error>;

    /// The first record matching a query
    ///
    /// Returns [`Error::NotFound`] when nothing matches.
    fn first<R: Record>(&mut self, query: &Query<R>) -> Result<R, Error>;

    /// Every record matching a query
    fn find<R: Record>(&mut self, query: &Query<R>) -> Result<Vec<R>, Error>;

    /// Delete every record matching the non-zero fields of `filter`
    fn delete<R: Record>(&mut self, filter: &R) -> Result<(), Error>;
}

/// Points around an operation where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before the record is inserted
    BeforeCreate,
    /// After the record is inserted
    AfterCreate,
    /// Before the record is loaded
    BeforeRead,
    /// After the record is loaded
    AfterRead,
    /// Before the record is saved
    BeforeUpdate,
    /// After the record is saved
    AfterUpdate,
    /// Before the record is deleted
    BeforeDelete,
    /// After the record is deleted
    AfterDelete,
    /// Before the records are queried, on the filter
    BeforeList,
    /// After the query, once per record
    AfterList,
    /// Before the merged record is saved
    BeforePatch,
    /// After the merged record is saved
    AfterPatch,
}

type Hook<T> = Box<dyn Fn(&Context, &mut T) -> Result<(), Error> + Send + Sync>;

/// Custom logic registered around generated operations
///
/// Hooks for the same point run in registration order. The first failure
/// stops the operation.
pub struct Hooks<T> {
    hooks: HashMap<HookPoint, Vec<Hook<T>>>,
}

impl<T> Hooks<T> {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    /// Register a hook
    pub fn register<F>(&mut self, point: HookPoint, hook: F) -> &mut Self
    where
        F: Fn(&Context, &mut T) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.hooks.entry(point).or_default().push(Box::new(hook));
        self
    }

    /// Run the hooks of one point
    pub fn run(&self, point: HookPoint, ctx: &Context, value: &mut T) -> Result<(), Error> {
        if let Some(hooks) = self.hooks.get(&point) {
            for hook in hooks {
                hook(ctx, value)?;
            }
        }
        Ok(())
    }
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Hooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.hooks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("Hooks").field("hooks", &counts).finish()
    }
}

/// Field paths selected for a patch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMask {
    paths: Vec<String>,
}

impl FieldMask {
    /// A mask selecting the given paths
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a top level field is selected, directly or through a sub-path
    pub fn contains(&self, field: &str) -> bool {
        self.paths.iter().any(|p| {
            p == field
                || p.strip_prefix(field)
                    .map(|rest| rest.starts_with('.'))
                    .unwrap_or(false)
        })
    }
}

impl From<prost_types::FieldMask> for FieldMask {
    fn from(mask: prost_types::FieldMask) -> Self {
        Self { paths: mask.paths }
    }
}

/// Set the position of every element to its index
pub fn renumber_positions<T>(items: &mut [T], mut set: impl FnMut(&mut T, i64)) {
    for (index, item) in items.iter_mut().enumerate() {
        set(item, index as i64);
    }
}

/// Primary key values that count as "not set"
pub trait ZeroValue {
    /// Whether the value equals the type's default
    fn is_zero(&self) -> bool;
}

macro_rules! impl_zero_value {
    ($($ty:ty),*) => {
        $(impl ZeroValue for $ty {
            fn is_zero(&self) -> bool {
                *self == <$ty>::default()
            }
        })*
    };
}

impl_zero_value!(i32, i64, u32, u64, f32, f64, bool);

impl ZeroValue for DateTime<Utc> {
    fn is_zero(&self) -> bool {
        self.timestamp() == 0 && self.timestamp_subsec_nanos() == 0
    }
}

impl ZeroValue for serde_json::Value {
    fn is_zero(&self) -> bool {
        self.is_null()
    }
}

impl ZeroValue for String {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ZeroValue for Vec<u8> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ZeroValue for Uuid {
    fn is_zero(&self) -> bool {
        self.is_nil()
    }
}

impl<T: ZeroValue> ZeroValue for Option<T> {
    fn is_zero(&self) -> bool {
        self.as_ref().map(ZeroValue::is_zero).unwrap_or(true)
    }
}

/// Convert a protobuf timestamp
pub fn timestamp_to_datetime(
    ts: Option<&prost_types::Timestamp>,
) -> Result<Option<DateTime<Utc>>, Error> {
    ts.map(|ts| {
        let nanos = u32::try_from(ts.nanos)
            .map_err(|_| Error::Conversion(format!("negative nanos in timestamp: {}", ts.nanos)))?;
        DateTime::from_timestamp(ts.seconds, nanos)
            .ok_or_else(|| Error::Conversion(format!("timestamp out of range: {}s", ts.seconds)))
    })
    .transpose()
}

/// Convert to a protobuf timestamp
pub fn datetime_to_timestamp(dt: Option<&DateTime<Utc>>) -> Option<prost_types::Timestamp> {
    dt.map(|dt| prost_types::Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    })
}

/// Parse a UUID message value; absent or empty is the nil UUID
pub fn uuid_from_pb(value: Option<&str>) -> Result<Uuid, Error> {
    match value {
        None | Some("") => Ok(Uuid::nil()),
        Some(s) => Uuid::parse_str(s).map_err(|e| Error::Conversion(format!("uuid {s:?}: {e}"))),
    }
}

/// Parse a nullable UUID message value; absent maps to `None`
pub fn optional_uuid_from_pb(value: Option<&str>) -> Result<Option<Uuid>, Error> {
    match value {
        None | Some("") => Ok(None),
        Some(s) => uuid_from_pb(Some(s)).map(Some),
    }
}

/// Text form of a UUID for the message side
pub fn uuid_to_pb(value: &Uuid) -> String {
    value.hyphenated().to_string()
}

/// Parse a JSON message value
pub fn json_from_pb(value: Option<&str>) -> Result<Option<serde_json::Value>, Error> {
    match value {
        None | Some("") => Ok(None),
        Some(s) => serde_json::from_str(s)
            .map(Some)
            .map_err(|e| Error::Conversion(format!("json: {e}"))),
    }
}

/// Text form of a JSON value for the message side
pub fn json_to_pb(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(|v| v.to_string())
}
