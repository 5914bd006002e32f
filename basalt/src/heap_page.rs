//! The slotted-page layout.
//!
//! A page is `PAGE_SIZE` bytes: a header bitmap of occupied slots (LSB-first,
//! bit 0 of byte 0 is slot 0) followed by a packed array of fixed-width tuple
//! slots. The number of slots is `(PAGE_SIZE * 8) / (tuple_bytes * 8 + 1)` so
//! that every slot has both its data bytes and its header bit inside the page.

use std::sync::Arc;

use crate::errors::DbError;
use crate::schema::Schema;
use crate::transaction::TransactionId;
use crate::tuple::{PageId, RecordId, Tuple};
use crate::PAGE_SIZE;

/// Number of tuple slots on a page holding tuples of `tuple_bytes` bytes.
pub fn slots_per_page(tuple_bytes: usize) -> usize {
    (PAGE_SIZE * 8) / (tuple_bytes * 8 + 1)
}

/// Header bitmap length for a page with `num_slots` slots.
pub fn header_len(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// One cached page of a heap file.
#[derive(Debug)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    header: Vec<u8>,
    slots: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
    // Page bytes as of the last time this page became clean; consumed by the
    // log interface at commit.
    before_image: Vec<u8>,
}

impl HeapPage {
    /// Parses a page from its on-disk bytes.
    ///
    /// Fails if `bytes` is not exactly one page or an occupied slot does not
    /// decode under the table schema.
    pub fn new(pid: PageId, bytes: &[u8], schema: Arc<Schema>) -> Result<Self, DbError> {
        if bytes.len() != PAGE_SIZE {
            return Err(DbError::Storage(format!(
                "page {pid} has {} bytes, expected {PAGE_SIZE}",
                bytes.len()
            )));
        }

        let tuple_bytes = schema.byte_size();
        let num_slots = slots_per_page(tuple_bytes);
        let header_len = header_len(num_slots);

        let mut header = bytes[..header_len].to_vec();
        // Bits past the last legal slot carry no meaning; keep them clear so
        // occupancy always equals the header population count.
        for stray in num_slots..header_len * 8 {
            header[stray / 8] &= !(1 << (stray % 8));
        }

        let mut slots = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) != 0 {
                let offset = header_len + slot * tuple_bytes;
                let mut tuple = Tuple::from_bytes(schema.clone(), &bytes[offset..])?;
                tuple.set_record_id(Some(RecordId::new(pid, slot)));
                slots.push(Some(tuple));
            } else {
                slots.push(None);
            }
        }

        let mut page = Self {
            pid,
            schema,
            header,
            slots,
            dirtied_by: None,
            before_image: Vec::new(),
        };
        page.before_image = page.page_data();
        Ok(page)
    }

    /// The all-zero byte image of a page with no occupied slots.
    pub fn empty_page_data() -> Vec<u8> {
        vec![0; PAGE_SIZE]
    }

    pub fn pid(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    fn slot_occupied(&self, slot: usize) -> bool {
        self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_bit(&mut self, slot: usize, occupied: bool) {
        if occupied {
            self.header[slot / 8] |= 1 << (slot % 8);
        } else {
            self.header[slot / 8] &= !(1 << (slot % 8));
        }
    }

    /// Places a tuple in the lowest-index empty slot and assigns its
    /// record id.
    ///
    /// The tuple's schema must equal the page's, and the tuple must not
    /// already live in an occupied slot elsewhere.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<(), DbError> {
        if **tuple.schema() != *self.schema {
            return Err(DbError::Storage(format!(
                "tuple schema does not match page {}",
                self.pid
            )));
        }
        if let Some(rid) = tuple.record_id() {
            if rid.page_id != self.pid || rid.slot >= self.slots.len() || self.slot_occupied(rid.slot)
            {
                return Err(DbError::Storage(format!(
                    "tuple already placed at {:?}",
                    rid
                )));
            }
        }

        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| DbError::Storage(format!("no empty slot on page {}", self.pid)))?;

        let rid = RecordId::new(self.pid, slot);
        tuple.set_record_id(Some(rid));
        self.slots[slot] = Some(tuple.clone());
        self.set_slot_bit(slot, true);
        Ok(())
    }

    /// Clears the slot named by the tuple's record id. The slot bytes remain
    /// on disk until overwritten but the tuple is logically gone.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<(), DbError> {
        let rid = tuple.record_id().ok_or_else(|| {
            DbError::Storage("cannot delete a tuple with no record id".to_string())
        })?;
        if rid.page_id != self.pid {
            return Err(DbError::Storage(format!(
                "tuple at {} does not live on page {}",
                rid.page_id, self.pid
            )));
        }
        if rid.slot >= self.slots.len() || !self.slot_occupied(rid.slot) {
            return Err(DbError::Storage(format!(
                "slot {} on page {} is not occupied",
                rid.slot, self.pid
            )));
        }
        self.slots[rid.slot] = None;
        self.set_slot_bit(rid.slot, false);
        Ok(())
    }

    /// Tuples in ascending slot order, skipping empty slots.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Serializes the page back to its on-disk byte image. Empty slots
    /// serialize as zeroes.
    pub fn page_data(&self) -> Vec<u8> {
        let tuple_bytes = self.schema.byte_size();
        let mut out = Vec::with_capacity(PAGE_SIZE);
        out.extend_from_slice(&self.header);
        for slot in &self.slots {
            match slot {
                Some(tuple) => out.extend_from_slice(&tuple.to_bytes()),
                None => out.resize(out.len() + tuple_bytes, 0),
            }
        }
        out.resize(PAGE_SIZE, 0);
        out
    }

    /// Marks the page dirty on behalf of a transaction, or clean.
    pub fn mark_dirty(&mut self, dirtier: Option<TransactionId>) {
        self.dirtied_by = dirtier;
    }

    /// The transaction that last dirtied this page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    /// Page bytes as of the last time this page became clean.
    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    /// Snapshots the current contents as the new before-image. Called after
    /// a successful flush, when the page becomes clean again.
    pub fn set_before_image(&mut self) {
        self.before_image = self.page_data();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::tuple::Value;

    fn two_int_schema() -> Arc<Schema> {
        Arc::new(Schema::of_types(&[FieldType::Int, FieldType::Int]).unwrap())
    }

    fn int_tuple(schema: &Arc<Schema>, a: i32, b: i32) -> Tuple {
        Tuple::new(schema.clone(), vec![Value::Int(a), Value::Int(b)]).unwrap()
    }

    #[test]
    fn slot_math_matches_the_format() {
        // Two ints: 8-byte tuples, 4096 * 8 / 65 slots, 63 header bytes.
        assert_eq!(slots_per_page(8), 504);
        assert_eq!(header_len(504), 63);
        // One int plus one text field: 136-byte tuples.
        assert_eq!(slots_per_page(136), 30);
        assert_eq!(header_len(30), 4);
    }

    #[test]
    fn empty_page_parses_with_all_slots_free() {
        let schema = two_int_schema();
        let page = HeapPage::new(
            PageId::new(1, 0),
            &HeapPage::empty_page_data(),
            schema,
        )
        .unwrap();
        assert_eq!(page.num_empty_slots(), page.num_slots());
        assert_eq!(page.iter().count(), 0);
    }

    #[test]
    fn wrong_sized_buffer_is_rejected() {
        let schema = two_int_schema();
        let err = HeapPage::new(PageId::new(1, 0), &[0u8; 100], schema);
        assert!(matches!(err, Err(DbError::Storage(_))));
    }

    #[test]
    fn insert_assigns_lowest_slot_and_record_id() {
        let schema = two_int_schema();
        let pid = PageId::new(1, 0);
        let mut page = HeapPage::new(pid, &HeapPage::empty_page_data(), schema.clone()).unwrap();

        let mut t0 = int_tuple(&schema, 1, 10);
        let mut t1 = int_tuple(&schema, 2, 20);
        page.insert_tuple(&mut t0).unwrap();
        page.insert_tuple(&mut t1).unwrap();

        assert_eq!(t0.record_id(), Some(RecordId::new(pid, 0)));
        assert_eq!(t1.record_id(), Some(RecordId::new(pid, 1)));
        assert_eq!(page.num_empty_slots(), page.num_slots() - 2);
    }

    #[test]
    fn delete_restores_the_empty_slot_count() {
        let schema = two_int_schema();
        let pid = PageId::new(1, 0);
        let mut page = HeapPage::new(pid, &HeapPage::empty_page_data(), schema.clone()).unwrap();
        let before = page.num_empty_slots();

        let mut t = int_tuple(&schema, 5, 50);
        page.insert_tuple(&mut t).unwrap();
        page.delete_tuple(&t).unwrap();

        assert_eq!(page.num_empty_slots(), before);
    }

    #[test]
    fn delete_requires_an_occupied_slot_on_this_page() {
        let schema = two_int_schema();
        let mut page =
            HeapPage::new(PageId::new(1, 0), &HeapPage::empty_page_data(), schema.clone())
                .unwrap();

        // Never inserted: no record id.
        let loose = int_tuple(&schema, 1, 1);
        assert!(page.delete_tuple(&loose).is_err());

        // Record id on another page.
        let mut elsewhere = int_tuple(&schema, 2, 2);
        elsewhere.set_record_id(Some(RecordId::new(PageId::new(1, 9), 0)));
        assert!(page.delete_tuple(&elsewhere).is_err());

        // Double delete.
        let mut t = int_tuple(&schema, 3, 3);
        page.insert_tuple(&mut t).unwrap();
        page.delete_tuple(&t).unwrap();
        assert!(page.delete_tuple(&t).is_err());
    }

    #[test]
    fn serialization_round_trips() {
        let schema = two_int_schema();
        let pid = PageId::new(2, 1);
        let mut page = HeapPage::new(pid, &HeapPage::empty_page_data(), schema.clone()).unwrap();
        for i in 0..10 {
            let mut t = int_tuple(&schema, i, i * 100);
            page.insert_tuple(&mut t).unwrap();
        }
        // Punch a hole so the bitmap is not a prefix of ones.
        let victim = page.iter().nth(3).cloned().unwrap();
        page.delete_tuple(&victim).unwrap();

        let bytes = page.page_data();
        assert_eq!(bytes.len(), PAGE_SIZE);
        let reparsed = HeapPage::new(pid, &bytes, schema).unwrap();
        assert_eq!(reparsed.page_data(), bytes);
        assert_eq!(reparsed.iter().count(), 9);
    }

    #[test]
    fn page_fills_up_and_rejects_further_inserts() {
        let schema = two_int_schema();
        let mut page =
            HeapPage::new(PageId::new(1, 0), &HeapPage::empty_page_data(), schema.clone())
                .unwrap();
        for i in 0..page.num_slots() as i32 {
            let mut t = int_tuple(&schema, i, i);
            page.insert_tuple(&mut t).unwrap();
        }
        assert_eq!(page.num_empty_slots(), 0);
        let mut overflow = int_tuple(&schema, -1, -1);
        assert!(page.insert_tuple(&mut overflow).is_err());
    }

    #[test]
    fn iteration_is_in_slot_order_and_skips_holes() {
        let schema = two_int_schema();
        let mut page =
            HeapPage::new(PageId::new(1, 0), &HeapPage::empty_page_data(), schema.clone())
                .unwrap();
        let mut tuples = Vec::new();
        for i in 0..5 {
            let mut t = int_tuple(&schema, i, 0);
            page.insert_tuple(&mut t).unwrap();
            tuples.push(t);
        }
        page.delete_tuple(&tuples[1]).unwrap();
        page.delete_tuple(&tuples[3]).unwrap();

        let seen: Vec<i32> = page
            .iter()
            .map(|t| match t.value(0).unwrap() {
                Value::Int(v) => *v,
                other => panic!("unexpected value {other:?}"),
            })
            .collect();
        assert_eq!(seen, vec![0, 2, 4]);
    }

    #[test]
    fn undecodable_slot_fails_the_parse() {
        let schema = Arc::new(Schema::of_types(&[FieldType::Text]).unwrap());
        let mut bytes = HeapPage::empty_page_data();
        // Occupy slot 0 but give it an impossible text length prefix.
        bytes[0] = 0b0000_0001;
        let hdr = header_len(slots_per_page(schema.byte_size()));
        bytes[hdr..hdr + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(HeapPage::new(PageId::new(1, 0), &bytes, schema).is_err());
    }

    #[test]
    fn dirty_marker_and_before_image() {
        let schema = two_int_schema();
        let mut page =
            HeapPage::new(PageId::new(1, 0), &HeapPage::empty_page_data(), schema.clone())
                .unwrap();
        assert!(page.dirtied_by().is_none());

        let snapshot = page.before_image().to_vec();
        let tid = TransactionId::new();
        let mut t = int_tuple(&schema, 9, 9);
        page.insert_tuple(&mut t).unwrap();
        page.mark_dirty(Some(tid));

        assert_eq!(page.dirtied_by(), Some(tid));
        // The before-image still reflects the clean state.
        assert_eq!(page.before_image(), &snapshot[..]);

        page.mark_dirty(None);
        page.set_before_image();
        assert_eq!(page.before_image(), &page.page_data()[..]);
    }
}
