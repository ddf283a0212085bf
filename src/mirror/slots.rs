//! Spreadsheet layout of the mirrored occupancy history.
//!
//! Territory `n` owns two rows starting at `6 + (n - 1) * 2`: the holder row
//! and the date row below it. Each of the five slots spans two columns
//! starting at `C`: holder name above the taken date, and the due (or
//! returned) date to the right of the taken date.

use crate::core::TerritoryId;
use crate::core::dates::format_date;
use crate::mirror::MirrorError;
use chrono::NaiveDate;

pub const SLOT_COUNT: usize = 5;
pub const FIRST_TERRITORY_ROW: u32 = 6;
pub const FIRST_SLOT_COLUMN: u32 = 3;
const BLOCK_WIDTH: usize = SLOT_COUNT * 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    pub holder: String,
    pub taken: String,
    pub due: String,
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        self.holder.trim().is_empty()
    }
}

/// In-memory copy of one territory's two-row block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotBlock {
    slots: [Slot; SLOT_COUNT],
    // holder-row cells right of each holder name are not slot data
    untouched: [String; SLOT_COUNT],
}

impl SlotBlock {
    /// Builds a block from ragged sheet rows (trailing blanks may be missing).
    pub fn from_rows(rows: &[Vec<String>]) -> Self {
        let cell = |row: usize, column: usize| -> String {
            rows.get(row)
                .and_then(|cells| cells.get(column))
                .cloned()
                .unwrap_or_default()
        };

        let mut block = Self::default();
        for index in 0..SLOT_COUNT {
            let column = index * 2;
            block.slots[index] = Slot {
                holder: cell(0, column),
                taken: cell(1, column),
                due: cell(1, column + 1),
            };
            block.untouched[index] = cell(0, column + 1);
        }
        block
    }

    pub fn to_rows(&self) -> Vec<Vec<String>> {
        let mut holder_row = Vec::with_capacity(BLOCK_WIDTH);
        let mut date_row = Vec::with_capacity(BLOCK_WIDTH);
        for (slot, untouched) in self.slots.iter().zip(&self.untouched) {
            holder_row.push(slot.holder.clone());
            holder_row.push(untouched.clone());
            date_row.push(slot.taken.clone());
            date_row.push(slot.due.clone());
        }
        vec![holder_row, date_row]
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Writes into the first free slot; when all are taken, shifts every slot
    /// left (dropping the oldest) and writes into the last one.
    pub fn record_assignment(&mut self, holder: &str, taken: NaiveDate, due: NaiveDate) {
        let slot = Slot {
            holder: holder.to_string(),
            taken: format_date(taken),
            due: format_date(due),
        };

        match self.slots.iter().position(Slot::is_empty) {
            Some(index) => self.slots[index] = slot,
            None => {
                self.slots.rotate_left(1);
                self.slots[SLOT_COUNT - 1] = slot;
            }
        }
    }

    /// Puts the return date into the due cell of the most recent slot.
    pub fn record_return(&mut self, returned: NaiveDate) {
        let index = self
            .slots
            .iter()
            .rposition(|slot| !slot.is_empty())
            .unwrap_or(0);
        self.slots[index].due = format_date(returned);
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}

/// A1 range of a territory's block. Ids whose rows do not fit in `u32` have
/// no block.
pub fn block_range(sheet: &str, territory_id: TerritoryId) -> Result<String, MirrorError> {
    let bottom = (territory_id.get() - 1)
        .checked_mul(2)
        .and_then(|offset| offset.checked_add(FIRST_TERRITORY_ROW + 1))
        .ok_or(MirrorError::OutOfRange(territory_id))?;
    let top = bottom - 1;
    let first = column_letter(FIRST_SLOT_COLUMN);
    let last = column_letter(FIRST_SLOT_COLUMN + BLOCK_WIDTH as u32 - 1);
    Ok(format!("{sheet}!{first}{top}:{last}{bottom}"))
}

/// 1-based column index to A1 letters.
fn column_letter(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn ranges_follow_two_rows_per_territory() {
        assert_eq!(
            block_range("Sheet1", TerritoryId::new(1).unwrap()).unwrap(),
            "Sheet1!C6:L7"
        );
        assert_eq!(
            block_range("Sheet1", TerritoryId::new(5).unwrap()).unwrap(),
            "Sheet1!C14:L15"
        );
        assert_eq!(column_letter(28), "AB");
    }

    #[test]
    fn huge_ids_have_no_block() {
        let last_fitting = TerritoryId::new(2_147_483_645).unwrap();
        assert_eq!(
            block_range("Sheet1", last_fitting).unwrap(),
            "Sheet1!C4294967294:L4294967295"
        );

        for raw in [2_147_483_646, 3_000_000_000, u32::MAX] {
            let id = TerritoryId::new(raw).unwrap();
            assert_eq!(block_range("Sheet1", id), Err(MirrorError::OutOfRange(id)));
        }
    }

    #[test]
    fn assignments_fill_free_slots_then_shift_left() {
        let mut block = SlotBlock::default();
        for day in 1..=5 {
            block.record_assignment(&format!("h{day}"), d(day), d(day + 10));
        }
        assert_eq!(block.slots()[4].holder, "h5");

        block.record_assignment("h6", d(6), d(16));
        let holders: Vec<_> = block.slots().iter().map(|s| s.holder.as_str()).collect();
        assert_eq!(holders, ["h2", "h3", "h4", "h5", "h6"]);
        assert_eq!(block.slots()[4].taken, "06.01.2025");
    }

    #[test]
    fn return_lands_on_latest_occupied_slot() {
        let mut block = SlotBlock::default();
        block.record_assignment("a", d(1), d(2));
        block.record_assignment("b", d(3), d(4));
        block.record_return(d(20));
        assert_eq!(block.slots()[1].due, "20.01.2025");
        assert_eq!(block.slots()[0].due, "02.01.2025");

        let mut empty = SlotBlock::default();
        empty.record_return(d(9));
        assert_eq!(empty.slots()[0].due, "09.01.2025");
    }

    #[test]
    fn ragged_rows_are_padded_and_extra_cells_kept() {
        let rows = vec![
            vec!["Alice".to_string(), "note".to_string()],
            vec!["01.01.2025".to_string()],
        ];
        let mut block = SlotBlock::from_rows(&rows);
        assert_eq!(block.slots()[0].holder, "Alice");
        assert_eq!(block.slots()[0].due, "");

        block.clear();
        let written = block.to_rows();
        assert_eq!(written[0].len(), 10);
        assert_eq!(written[0][0], "");
        assert_eq!(written[0][1], "note");
        assert!(written[1].iter().all(String::is_empty));
    }
}
