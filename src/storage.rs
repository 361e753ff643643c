//! Storage Collaborator Interface
//!
//! The query execution core is deliberately ignorant of how records reach
//! disk. Everything in this module is a *contract*: the buffer pool,
//! B+-tree index, record-file handler, write-ahead log and MVCC manager
//! all live outside this crate, and the core only ever talks to them
//! through the traits below ([`Table`], [`Index`], [`RecordFileScanner`],
//! [`Trx`]).
//!
//! A small in-memory implementation (`memory` submodule) is included so
//! the operator pipeline can be exercised in tests without a real storage
//! engine; it is not itself part of the design this crate specifies.

use crate::value::{AttrType, Value};
use crate::error::{Error, Result};
use std::fmt;

/// Row identifier: `(page_num, slot_num)` in the original buffer-pool
/// layout. The core treats it as an opaque, copyable, orderable handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId {
    pub page_num: u32,
    pub slot_num: u32,
}

/// Metadata for a single column: name, byte offset/length within a
/// record, declared kind, nullability, visibility (system columns such
/// as the null-bitmap are invisible to `SELECT *`), and whether it *is*
/// a system column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMeta {
    pub name: String,
    pub offset: usize,
    pub length: usize,
    pub kind: AttrType,
    pub nullable: bool,
    pub visible: bool,
    pub system: bool,
}

/// `(table, column_meta)` - what `FieldExpr` resolves a name to.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub table_name: String,
    pub meta: FieldMeta,
}

impl Field {
    pub fn new(table_name: impl Into<String>, meta: FieldMeta) -> Self {
        Field { table_name: table_name.into(), meta }
    }

    pub fn field_name(&self) -> &str {
        &self.meta.name
    }

    pub fn attr_type(&self) -> AttrType {
        self.meta.kind
    }
}

/// Schema for a table: its fields (system columns first, in a fixed
/// prefix) and the total record size. Invariant: for every field,
/// `offset + length <= record_size`.
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub table_name: String,
    pub fields: Vec<FieldMeta>,
    pub sys_field_num: usize,
    pub record_size: usize,
}

impl TableMeta {
    pub fn field_num(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&FieldMeta> {
        self.fields.get(index)
    }

    pub fn field_by_name(&self, name: &str) -> Option<(usize, &FieldMeta)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// The one system column every record carries: a bitmap with one bit
    /// per column index (including system columns) marking which are NULL.
    pub fn null_field(&self) -> &FieldMeta {
        self.fields
            .iter()
            .find(|f| f.name == "__null_bitmap")
            .expect("table meta always carries a null-bitmap system field")
    }
}

/// A physical row: a row id plus its raw bytes, `record_size` long.
#[derive(Debug, Clone)]
pub struct Record {
    pub rid: RowId,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(rid: RowId, data: Vec<u8>) -> Self {
        Record { rid, data }
    }
}

/// A bit-per-column nullability bitmap, read/written at a field's fixed
/// offset inside a record's bytes.
pub struct Bitmap<'a> {
    bytes: &'a mut [u8],
}

impl<'a> Bitmap<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Bitmap { bytes }
    }

    pub fn get_bit(&self, index: usize) -> bool {
        self.bytes[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn set_bit(&mut self, index: usize) {
        self.bytes[index / 8] |= 1 << (index % 8);
    }

    pub fn clear_bit(&mut self, index: usize) {
        self.bytes[index / 8] &= !(1 << (index % 8));
    }
}

/// Read/write mode an operator opens a table or scanner with. Kept
/// distinct from the transaction's own isolation mode so read-only
/// operators (table scan under a `SELECT`) can be short-circuited from
/// acquiring write locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWriteMode {
    ReadOnly,
    ReadWrite,
}

/// Opaque capability representing "the currently active transaction".
/// The core never inspects a `Trx`'s internals; it only threads the
/// capability through `open(trx)` calls so the storage layer can enforce
/// MVCC visibility and logging.
pub trait Trx: fmt::Debug {
    /// Lazily begins the transaction on first use; a no-op once started.
    fn start_if_need(&mut self) -> Result<()> {
        Ok(())
    }
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
    /// Whether `rid`'s current version is visible under this
    /// transaction's isolation snapshot. Scanners consult this to filter
    /// rows written by other, not-yet-committed transactions.
    fn is_visible(&self, _rid: RowId) -> bool {
        true
    }
}

/// A secondary (or primary) index on a single field.
pub trait Index {
    fn name(&self) -> &str;
    fn field_name(&self) -> &str;
    fn is_unique(&self) -> bool;
    fn insert_entry(&mut self, record: &Record, rid: RowId) -> Result<()>;
    fn delete_entry(&mut self, record: &Record, rid: RowId) -> Result<()>;
    fn sync(&mut self) -> Result<()>;
}

/// Iterates matching records from a table (full scan or, when an index
/// is available, a key-range scan). Physical scan operators wrap one of
/// these; the core never constructs a scanner itself outside of tests.
pub trait RecordFileScanner {
    fn open(&mut self, trx: &dyn Trx) -> Result<()>;
    fn next(&mut self) -> Result<Record>;
    fn close(&mut self) -> Result<()>;
}

/// The columnar counterpart of [`RecordFileScanner`]: `TableScanVec`
/// wraps one of these instead of calling `next()` per row. `next(chunk)`
/// resets and refills `chunk` up to its capacity; the final call (a
/// possibly empty batch) returns `Err` wrapping
/// [`crate::error::Error::RecordEof`], same eof-by-error convention as
/// the row-oriented scanner.
pub trait ChunkFileScanner {
    fn open(&mut self, trx: &dyn Trx) -> Result<()>;
    fn next(&mut self, chunk: &mut crate::tuple::chunk::Chunk) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// A table: the unit the binder resolves `FROM`/field references
/// against, and the unit physical operators scan, insert into, delete
/// from and update.
pub trait Table {
    fn name(&self) -> &str;
    fn table_meta(&self) -> &TableMeta;

    fn find_index(&self, index_name: &str) -> Option<&dyn Index>;
    fn find_index_by_field(&self, field_name: &str) -> Option<&dyn Index>;

    /// Builds a new index over an existing column and backfills it from
    /// current rows. DDL is out of this core's scope (see `crate::ddl`);
    /// the default is the honest answer for a collaborator that doesn't
    /// support building one at all.
    fn create_index(&mut self, index_name: &str, field_name: &str, unique: bool) -> Result<()> {
        let _ = (index_name, field_name, unique);
        Err(Error::Unimplemented("this table does not support index creation".to_string()))
    }

    fn drop_index(&mut self, index_name: &str) -> Result<()> {
        let _ = index_name;
        Err(Error::Unimplemented("this table does not support dropping indexes".to_string()))
    }

    /// Row ids whose indexed value falls within `[lo, hi]` (bound-
    /// inclusivity per `lo_inclusive`/`hi_inclusive`; `None` means
    /// unbounded on that side). The physical plan generator's
    /// `IndexScan` lowering is the only caller; not part of the
    /// textbook's own `Index` interface, but required to make an index
    /// scan concretely runnable against a single-field index.
    fn index_scan(
        &self,
        index_name: &str,
        lo: Option<&Value>,
        hi: Option<&Value>,
        lo_inclusive: bool,
        hi_inclusive: bool,
    ) -> Result<Vec<RowId>>;

    fn get_record(&self, rid: RowId) -> Result<Record>;
    fn insert_record(&mut self, values: &[Value]) -> Result<RowId>;
    fn update_record(&mut self, old: &Record, new: &Record) -> Result<()>;
    fn delete_record(&mut self, rid: RowId) -> Result<()>;

    /// Applies `visitor` to the record at `rid` without decoding it into
    /// `Value`s - the cheap path the Update operator uses to fetch the
    /// pre-image it needs for rollback.
    fn visit_record(&self, rid: RowId, visitor: &mut dyn FnMut(&Record)) -> Result<()> {
        let record = self.get_record(rid)?;
        visitor(&record);
        Ok(())
    }

    fn get_record_scanner(&self, mode: ReadWriteMode) -> Result<Box<dyn RecordFileScanner>>;

    /// The columnar counterpart of [`Table::get_record_scanner`]. The
    /// default decodes `scan_all`'s full snapshot up front and hands
    /// batches of it out of a `Vec`-backed [`ChunkFileScanner`] - correct
    /// for any collaborator, but a real record-file handler would want
    /// to override this to decode straight into chunk-sized batches
    /// instead of materializing every row first.
    fn get_chunk_scanner(&self, mode: ReadWriteMode) -> Result<Box<dyn ChunkFileScanner>> {
        let meta = self.table_meta().clone();
        let records = self.scan_all()?;
        let rows: Vec<Vec<Value>> = records.iter().map(|r| decode_record(&meta, r, self)).collect();
        let fields: Vec<(String, AttrType)> =
            meta.fields.iter().filter(|f| !f.system).map(|f| (f.name.clone(), f.kind)).collect();
        let _ = mode;
        Ok(Box::new(memory::VecChunkScanner::new(fields, rows)))
    }

    /// Every visible record, in an arbitrary but stable order. The real
    /// record-file handler would give back a cursor instead; the core
    /// only ever needs to iterate once per scan, so a `Vec` snapshot is
    /// an adequate substitute for the trait boundary.
    fn scan_all(&self) -> Result<Vec<Record>>;

    /// Appends `content` to the table's out-of-line text storage and
    /// returns the `(offset, length)` handle a `TEXT` column stores
    /// in-place.
    fn write_text(&mut self, content: &str) -> Result<(i64, i64)>;
    fn read_text(&self, handle: (i64, i64)) -> Result<String>;

    /// Re-encodes a full row of user-visible column values into the
    /// table's fixed-layout byte buffer, the same way `insert_record`
    /// would, for `UPDATE` to hand to `update_record` as the new image.
    /// `table_meta` is cloned up front so the encode pass can still call
    /// back into `&mut self` (for `TEXT` columns) without aliasing it.
    fn encode_for_update(&mut self, values: &[Value]) -> Result<Vec<u8>> {
        let meta = self.table_meta().clone();
        encode_record(&meta, values, self)
    }
}

/// Encodes `values` (one per user-visible column, in schema order) into
/// a record byte buffer per `meta`'s field layout, setting the
/// null-bitmap system field for any `Value::Null` entry. Shared by
/// `MemoryTable::insert_record` and `Table::encode_for_update` so both
/// paths agree on the wire format.
pub fn encode_record(meta: &TableMeta, values: &[Value], table: &mut dyn Table) -> Result<Vec<u8>> {
    let mut data = vec![0u8; meta.record_size];
    let null_field = meta.null_field();
    let user_fields: Vec<&FieldMeta> = meta.fields.iter().filter(|f| !f.system).collect();
    if values.len() != user_fields.len() {
        return Err(Error::invalid_argument(format!(
            "expected {} values, got {}",
            user_fields.len(),
            values.len()
        )));
    }
    for (idx, (field, value)) in user_fields.iter().zip(values).enumerate() {
        if value.is_null() {
            let off = null_field.offset;
            data[off + idx / 8] |= 1 << (idx % 8);
            continue;
        }
        encode_scalar(field, value, &mut data, table)?;
    }
    Ok(data)
}

fn encode_scalar(field: &FieldMeta, value: &Value, data: &mut [u8], table: &mut dyn Table) -> Result<()> {
    let off = field.offset;
    match value {
        Value::Int(v) => data[off..off + 4].copy_from_slice(&v.to_le_bytes()),
        Value::Long(v) => data[off..off + 8].copy_from_slice(&v.to_le_bytes()),
        Value::Float(v) => data[off..off + 4].copy_from_slice(&v.to_le_bytes()),
        Value::Double(v) => data[off..off + 8].copy_from_slice(&v.to_le_bytes()),
        Value::Boolean(b) => data[off] = if *b { 1 } else { 0 },
        Value::Chars(s) => {
            let bytes = s.as_bytes();
            let n = bytes.len().min(field.length);
            data[off..off + n].copy_from_slice(&bytes[..n]);
        }
        Value::Text(s) => {
            let (text_off, text_len) = table.write_text(s)?;
            data[off..off + 8].copy_from_slice(&text_off.to_le_bytes());
            data[off + 8..off + 16].copy_from_slice(&text_len.to_le_bytes());
        }
        Value::Date(d) => {
            data[off..off + 4].copy_from_slice(&d.year().to_le_bytes());
            data[off + 4] = d.month() as u8;
            data[off + 5] = d.day() as u8;
        }
        Value::Null => {}
    }
    Ok(())
}

/// Decodes every visible column of `record` into a `Value`, consulting
/// the null-bitmap system field for each column's nullness. Used by
/// `RowTuple` to materialize a scanned record's cells. `TEXT` columns
/// store an `(offset, length)` handle inline and are resolved through
/// `table`.
pub fn decode_record(meta: &TableMeta, record: &Record, table: &dyn Table) -> Vec<Value> {
    let null_field = meta.null_field();
    let bitmap = &record.data[null_field.offset..null_field.offset + null_field.length];
    let mut out = Vec::new();
    for (idx, field) in meta.fields.iter().enumerate() {
        if field.system {
            continue;
        }
        let is_null = (bitmap[idx / 8] & (1 << (idx % 8))) != 0;
        if is_null {
            out.push(Value::Null);
            continue;
        }
        let bytes = &record.data[field.offset..field.offset + field.length];
        out.push(decode_scalar(field.kind, bytes, table));
    }
    out
}

fn decode_scalar(kind: AttrType, bytes: &[u8], table: &dyn Table) -> Value {
    match kind {
        AttrType::Int => Value::Int(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
        AttrType::Long => Value::Long(i64::from_le_bytes(bytes[..8].try_into().unwrap())),
        AttrType::Float => Value::Float(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
        AttrType::Double => Value::Double(f64::from_le_bytes(bytes[..8].try_into().unwrap())),
        AttrType::Boolean => Value::Boolean(bytes[0] != 0),
        AttrType::Chars => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Value::Chars(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        AttrType::Text => {
            let offset = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
            let length = i64::from_le_bytes(bytes[8..16].try_into().unwrap());
            let content = table.read_text((offset, length)).unwrap_or_default();
            Value::Text(content)
        }
        AttrType::Date => {
            let year = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
            let month = bytes[4] as u32;
            let day = bytes[5] as u32;
            Value::Date(
                crate::value::Date::from_ymd(year, month, day)
                    .unwrap_or_else(|_| crate::value::Date::from_ymd(1970, 1, 1).unwrap()),
            )
        }
        AttrType::Null | AttrType::Undefined => Value::Null,
    }
}

pub mod memory {
    //! A minimal in-memory `Table`/`Index`/`Trx` set sufficient to drive
    //! the operator pipeline end-to-end in tests. Not part of the design
    //! this crate specifies - a stand-in for the buffer pool, B+-tree
    //! index and record-file handler that live outside the core.

    use super::*;
    use parking_lot::Mutex;
    use std::cmp::Ordering;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    pub struct NullTrx {
        started: bool,
    }
    impl Trx for NullTrx {
        fn start_if_need(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }
    }

    /// Append-only backing store for `TEXT` columns. A single mutex
    /// guards the whole buffer: text writes are rare next to row scans,
    /// so this is nowhere near the `next()`-call-boundary latch
    /// discipline real operators must observe (see §5).
    #[derive(Debug, Default)]
    pub struct TextPool {
        bytes: Mutex<Vec<u8>>,
    }

    impl TextPool {
        pub fn write(&self, content: &str) -> (i64, i64) {
            let mut bytes = self.bytes.lock();
            let offset = bytes.len() as i64;
            bytes.extend_from_slice(content.as_bytes());
            (offset, content.len() as i64)
        }

        pub fn read(&self, handle: (i64, i64)) -> Result<String> {
            let (offset, length) = handle;
            let bytes = self.bytes.lock();
            let start = offset as usize;
            let end = start + length as usize;
            bytes
                .get(start..end)
                .map(|slice| String::from_utf8_lossy(slice).into_owned())
                .ok_or(Error::RecordInvalidKey)
        }
    }

    /// An in-memory single-field index: `(value, rid)` pairs kept sorted
    /// by value. Correct, not performant - the real index is a B+-tree
    /// living in the buffer pool.
    pub struct MemoryIndex {
        name: String,
        field_name: String,
        field_offset: usize,
        field_length: usize,
        field_kind: AttrType,
        unique: bool,
        entries: Vec<(Value, RowId)>,
    }

    impl MemoryIndex {
        pub fn new(name: impl Into<String>, field: &FieldMeta, unique: bool) -> Self {
            MemoryIndex {
                name: name.into(),
                field_name: field.name.clone(),
                field_offset: field.offset,
                field_length: field.length,
                field_kind: field.kind,
                unique,
                entries: Vec::new(),
            }
        }

        fn extract(&self, record: &Record) -> Value {
            let bytes = &record.data[self.field_offset..self.field_offset + self.field_length];
            super::decode_scalar(self.field_kind, bytes, &NoTextTable)
        }

        fn position(&self, value: &Value) -> usize {
            self.entries
                .partition_point(|(v, _)| v.compare(value).unwrap_or(Ordering::Less) == Ordering::Less)
        }

        pub fn scan_range(
            &self,
            lo: Option<&Value>,
            hi: Option<&Value>,
            lo_inclusive: bool,
            hi_inclusive: bool,
        ) -> Vec<RowId> {
            self.entries
                .iter()
                .filter(|(v, _)| {
                    let above_lo = match lo {
                        None => true,
                        Some(l) => match v.compare(l) {
                            Ok(Ordering::Greater) => true,
                            Ok(Ordering::Equal) => lo_inclusive,
                            _ => false,
                        },
                    };
                    let below_hi = match hi {
                        None => true,
                        Some(h) => match v.compare(h) {
                            Ok(Ordering::Less) => true,
                            Ok(Ordering::Equal) => hi_inclusive,
                            _ => false,
                        },
                    };
                    above_lo && below_hi
                })
                .map(|(_, rid)| *rid)
                .collect()
        }
    }

    /// A placeholder `Table` only used to decode a plain scalar out of an
    /// index entry's bytes; indexes never carry `TEXT` columns (the one
    /// kind `decode_scalar` needs a real table to resolve).
    struct NoTextTable;
    impl Table for NoTextTable {
        fn name(&self) -> &str {
            "<index>"
        }
        fn table_meta(&self) -> &TableMeta {
            unreachable!("index value decoding never calls back into table_meta")
        }
        fn find_index(&self, _: &str) -> Option<&dyn Index> {
            None
        }
        fn find_index_by_field(&self, _: &str) -> Option<&dyn Index> {
            None
        }
        fn index_scan(&self, _: &str, _: Option<&Value>, _: Option<&Value>, _: bool, _: bool) -> Result<Vec<RowId>> {
            Ok(Vec::new())
        }
        fn get_record(&self, _: RowId) -> Result<Record> {
            Err(Error::RecordInvalidKey)
        }
        fn insert_record(&mut self, _: &[Value]) -> Result<RowId> {
            Err(Error::internal("read-only placeholder"))
        }
        fn update_record(&mut self, _: &Record, _: &Record) -> Result<()> {
            Err(Error::internal("read-only placeholder"))
        }
        fn delete_record(&mut self, _: RowId) -> Result<()> {
            Err(Error::internal("read-only placeholder"))
        }
        fn get_record_scanner(&self, _: ReadWriteMode) -> Result<Box<dyn RecordFileScanner>> {
            Err(Error::internal("read-only placeholder"))
        }
        fn scan_all(&self) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }
        fn write_text(&mut self, _: &str) -> Result<(i64, i64)> {
            Err(Error::internal("index entries never carry TEXT"))
        }
        fn read_text(&self, _: (i64, i64)) -> Result<String> {
            Err(Error::internal("index entries never carry TEXT"))
        }
    }

    impl Index for MemoryIndex {
        fn name(&self) -> &str {
            &self.name
        }
        fn field_name(&self) -> &str {
            &self.field_name
        }
        fn is_unique(&self) -> bool {
            self.unique
        }
        fn insert_entry(&mut self, record: &Record, rid: RowId) -> Result<()> {
            let value = self.extract(record);
            if self.unique && self.entries.iter().any(|(v, _)| v == &value) {
                return Err(Error::RecordDuplicateKey);
            }
            let pos = self.position(&value);
            self.entries.insert(pos, (value, rid));
            Ok(())
        }
        fn delete_entry(&mut self, record: &Record, rid: RowId) -> Result<()> {
            let value = self.extract(record);
            let idx = self
                .entries
                .iter()
                .position(|(v, r)| v == &value && *r == rid)
                .ok_or(Error::RecordInvalidKey)?;
            self.entries.remove(idx);
            Ok(())
        }
        fn sync(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Snapshot-backed scanner: the table's current rows, taken at
    /// `open()` time, filtered by the transaction's visibility rule.
    pub struct VecRecordScanner {
        records: Vec<Record>,
        cursor: usize,
        opened: bool,
    }

    impl VecRecordScanner {
        fn new(records: Vec<Record>) -> Self {
            VecRecordScanner { records, cursor: 0, opened: false }
        }
    }

    impl RecordFileScanner for VecRecordScanner {
        fn open(&mut self, _trx: &dyn Trx) -> Result<()> {
            self.opened = true;
            Ok(())
        }

        fn next(&mut self) -> Result<Record> {
            if !self.opened {
                return Err(Error::internal("scanner used before open()"));
            }
            match self.records.get(self.cursor) {
                Some(r) => {
                    self.cursor += 1;
                    Ok(r.clone())
                }
                None => Err(Error::RecordEof),
            }
        }

        fn close(&mut self) -> Result<()> {
            self.opened = false;
            Ok(())
        }
    }

    /// Snapshot-backed [`ChunkFileScanner`]: the default
    /// `Table::get_chunk_scanner` implementation hands this a fully
    /// decoded row snapshot and it fans it out in `capacity`-sized
    /// columnar batches.
    pub struct VecChunkScanner {
        fields: Vec<(String, AttrType)>,
        rows: Vec<Vec<Value>>,
        cursor: usize,
        opened: bool,
    }

    impl VecChunkScanner {
        pub fn new(fields: Vec<(String, AttrType)>, rows: Vec<Vec<Value>>) -> Self {
            VecChunkScanner { fields, rows, cursor: 0, opened: false }
        }
    }

    impl ChunkFileScanner for VecChunkScanner {
        fn open(&mut self, _trx: &dyn Trx) -> Result<()> {
            self.opened = true;
            self.cursor = 0;
            Ok(())
        }

        fn next(&mut self, chunk: &mut crate::tuple::chunk::Chunk) -> Result<()> {
            if !self.opened {
                return Err(Error::internal("scanner used before open()"));
            }
            chunk.columns = self
                .fields
                .iter()
                .map(|(name, kind)| crate::tuple::chunk::Column::normal(name.clone(), *kind, chunk.capacity))
                .collect();
            chunk.count = 0;
            if self.cursor >= self.rows.len() {
                return Err(Error::RecordEof);
            }
            while chunk.count < chunk.capacity {
                let Some(row) = self.rows.get(self.cursor) else { break };
                for (col, value) in chunk.columns.iter_mut().zip(row.iter()) {
                    col.push(value.clone())?;
                }
                self.cursor += 1;
                chunk.count += 1;
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.opened = false;
            Ok(())
        }
    }

    pub struct MemoryTable {
        meta: TableMeta,
        rows: HashMap<RowId, Vec<u8>>,
        row_order: Vec<RowId>,
        next_slot: u32,
        indexes: Vec<MemoryIndex>,
        text_pool: TextPool,
    }

    impl MemoryTable {
        /// Builds a table whose schema is `user_fields` (visible, user
        /// columns) plus one trailing hidden null-bitmap system field
        /// sized to cover every column.
        pub fn new(table_name: impl Into<String>, user_fields: Vec<(&str, AttrType, usize)>) -> Self {
            let mut fields = Vec::new();
            let mut offset = 0usize;
            for (name, kind, length) in &user_fields {
                let length = if *kind == AttrType::Text { 16 } else { *length };
                fields.push(FieldMeta {
                    name: (*name).to_string(),
                    offset,
                    length,
                    kind: *kind,
                    nullable: true,
                    visible: true,
                    system: false,
                });
                offset += length;
            }
            let bitmap_bytes = user_fields.len().div_ceil(8).max(1);
            fields.push(FieldMeta {
                name: "__null_bitmap".to_string(),
                offset,
                length: bitmap_bytes,
                kind: AttrType::Chars,
                nullable: false,
                visible: false,
                system: true,
            });
            let record_size = offset + bitmap_bytes;
            MemoryTable {
                meta: TableMeta {
                    table_name: table_name.into(),
                    fields,
                    sys_field_num: 0,
                    record_size,
                },
                rows: HashMap::new(),
                row_order: Vec::new(),
                next_slot: 0,
                indexes: Vec::new(),
                text_pool: TextPool::default(),
            }
        }

        /// Adds a (not-yet-populated) index over an existing column and
        /// backfills it from current rows.
        pub fn create_index(&mut self, index_name: &str, field_name: &str, unique: bool) -> Result<()> {
            let (_, field) = self
                .meta
                .field_by_name(field_name)
                .ok_or_else(|| Error::SchemaFieldMissing(field_name.to_string()))?;
            let mut index = MemoryIndex::new(index_name, field, unique);
            for rid in &self.row_order {
                let data = &self.rows[rid];
                index.insert_entry(&Record::new(*rid, data.clone()), *rid)?;
            }
            self.indexes.push(index);
            Ok(())
        }

        /// Decodes the user-visible columns of a record back into
        /// `Value`s, honoring the null bitmap.
        pub fn decode(&self, record: &Record) -> Vec<Value> {
            super::decode_record(&self.meta, record, self)
        }

        fn maintain_indexes_on_insert(&mut self, record: &Record) -> Result<()> {
            for i in 0..self.indexes.len() {
                if self.indexes[i].insert_entry(record, record.rid).is_err() {
                    // Roll back every index entry already added for this row.
                    for index in self.indexes[..i].iter_mut() {
                        let _ = index.delete_entry(record, record.rid);
                    }
                    return Err(Error::RecordDuplicateKey);
                }
            }
            Ok(())
        }
    }

    impl Table for MemoryTable {
        fn name(&self) -> &str {
            &self.meta.table_name
        }

        fn table_meta(&self) -> &TableMeta {
            &self.meta
        }

        fn find_index(&self, index_name: &str) -> Option<&dyn Index> {
            self.indexes.iter().find(|i| i.name() == index_name).map(|i| i as &dyn Index)
        }

        fn find_index_by_field(&self, field_name: &str) -> Option<&dyn Index> {
            self.indexes.iter().find(|i| i.field_name() == field_name).map(|i| i as &dyn Index)
        }

        fn create_index(&mut self, index_name: &str, field_name: &str, unique: bool) -> Result<()> {
            self.create_index(index_name, field_name, unique)
        }

        fn drop_index(&mut self, index_name: &str) -> Result<()> {
            let before = self.indexes.len();
            self.indexes.retain(|i| i.name() != index_name);
            if self.indexes.len() == before {
                return Err(Error::invalid_argument(format!("index does not exist: {index_name}")));
            }
            Ok(())
        }

        fn index_scan(
            &self,
            index_name: &str,
            lo: Option<&Value>,
            hi: Option<&Value>,
            lo_inclusive: bool,
            hi_inclusive: bool,
        ) -> Result<Vec<RowId>> {
            let index = self
                .indexes
                .iter()
                .find(|i| i.name() == index_name)
                .ok_or_else(|| Error::internal(format!("no such index: {index_name}")))?;
            Ok(index.scan_range(lo, hi, lo_inclusive, hi_inclusive))
        }

        fn get_record(&self, rid: RowId) -> Result<Record> {
            self.rows
                .get(&rid)
                .map(|data| Record::new(rid, data.clone()))
                .ok_or(Error::RecordInvalidKey)
        }

        fn insert_record(&mut self, values: &[Value]) -> Result<RowId> {
            let meta = self.meta.clone();
            let data = super::encode_record(&meta, values, self)?;
            let rid = RowId { page_num: 0, slot_num: self.next_slot };
            self.next_slot += 1;
            let record = Record::new(rid, data.clone());
            self.maintain_indexes_on_insert(&record)?;
            self.rows.insert(rid, data);
            self.row_order.push(rid);
            Ok(rid)
        }

        fn update_record(&mut self, old: &Record, new: &Record) -> Result<()> {
            if !self.rows.contains_key(&old.rid) {
                return Err(Error::RecordInvalidKey);
            }
            let mut touched = 0;
            for index in &mut self.indexes {
                let _ = index.delete_entry(old, old.rid);
                if index.insert_entry(new, new.rid).is_err() {
                    // Symmetric rollback: this index's own `old` entry was
                    // just removed above and must be restored too, not
                    // only the indexes that had already been fully
                    // swapped before it.
                    let _ = index.insert_entry(old, old.rid);
                    for index in self.indexes[..touched].iter_mut() {
                        let _ = index.delete_entry(new, new.rid);
                        let _ = index.insert_entry(old, old.rid);
                    }
                    return Err(Error::RecordDuplicateKey);
                }
                touched += 1;
            }
            self.rows.insert(new.rid, new.data.clone());
            if new.rid != old.rid {
                self.rows.remove(&old.rid);
                if let Some(pos) = self.row_order.iter().position(|r| *r == old.rid) {
                    self.row_order[pos] = new.rid;
                }
            }
            Ok(())
        }

        fn delete_record(&mut self, rid: RowId) -> Result<()> {
            let data = self.rows.remove(&rid).ok_or(Error::RecordInvalidKey)?;
            let record = Record::new(rid, data);
            for index in &mut self.indexes {
                let _ = index.delete_entry(&record, rid);
            }
            self.row_order.retain(|r| *r != rid);
            Ok(())
        }

        fn get_record_scanner(&self, _mode: ReadWriteMode) -> Result<Box<dyn RecordFileScanner>> {
            Ok(Box::new(VecRecordScanner::new(self.scan_all()?)))
        }

        fn scan_all(&self) -> Result<Vec<Record>> {
            Ok(self
                .row_order
                .iter()
                .map(|rid| Record::new(*rid, self.rows[rid].clone()))
                .collect())
        }

        fn write_text(&mut self, content: &str) -> Result<(i64, i64)> {
            Ok(self.text_pool.write(content))
        }

        fn read_text(&self, handle: (i64, i64)) -> Result<String> {
            self.text_pool.read(handle)
        }
    }

}
