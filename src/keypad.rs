//! Numeric-keypad scan codes and their navigation meaning.
//!
//! Scan codes are layout independent and identical whether Num Lock is on or
//! off, which is what lets the hook classify a key before the OS translates
//! it into a digit or a navigation key. The dedicated navigation cluster
//! reuses the same codes with the extended flag set; callers must reject
//! extended events before classifying.

#[cfg(feature = "recorder")]
use serde::{Deserialize, Serialize};

/// Numpad 7 / Home.
pub const SC_NUMPAD7: u32 = 0x47;
/// Numpad 8 / Up.
pub const SC_NUMPAD8: u32 = 0x48;
/// Numpad 9 / Page Up.
pub const SC_NUMPAD9: u32 = 0x49;
/// Numpad 4 / Left.
pub const SC_NUMPAD4: u32 = 0x4B;
/// Numpad 5 / Clear.
pub const SC_NUMPAD5: u32 = 0x4C;
/// Numpad 6 / Right.
pub const SC_NUMPAD6: u32 = 0x4D;
/// Numpad 1 / End.
pub const SC_NUMPAD1: u32 = 0x4F;
/// Numpad 2 / Down.
pub const SC_NUMPAD2: u32 = 0x50;
/// Numpad 3 / Page Down.
pub const SC_NUMPAD3: u32 = 0x51;
/// Numpad 0 / Insert.
pub const SC_NUMPAD0: u32 = 0x52;

/// Virtual key code of the Num Lock key.
pub const VK_NUMLOCK: u32 = 0x90;

/// Grid rows/columns reachable from the keypad.
pub const GRID_SIZE: u8 = 3;

/// Scan codes laid out as they sit on the keypad, top row first.
const GRID: [[u32; 3]; 3] = [
    [SC_NUMPAD7, SC_NUMPAD8, SC_NUMPAD9],
    [SC_NUMPAD4, SC_NUMPAD5, SC_NUMPAD6],
    [SC_NUMPAD1, SC_NUMPAD2, SC_NUMPAD3],
];

/// What a relevant keypad key means to the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub enum NavKey {
    /// Activate the button at this cell of the 3x3 navigation block.
    Cell { row: u8, col: u8 },
    /// Go to the parent folder.
    Back,
}

impl NavKey {
    /// Classify a raw scan code. Returns `None` for anything outside the
    /// nine grid keys and Back.
    pub fn from_scan_code(scan_code: u32) -> Option<Self> {
        if scan_code == SC_NUMPAD0 {
            return Some(NavKey::Back);
        }
        GRID.iter().enumerate().find_map(|(row, codes)| {
            codes.iter().position(|&c| c == scan_code).map(|col| NavKey::Cell {
                row: row as u8,
                col: col as u8,
            })
        })
    }

    /// The scan code that produces this key.
    pub fn scan_code(&self) -> u32 {
        match *self {
            NavKey::Back => SC_NUMPAD0,
            NavKey::Cell { row, col } => GRID[row as usize][col as usize],
        }
    }

    /// Bit index used by [`crate::state::KeyLatch`]: 0..=8 for cells, 9 for Back.
    pub fn index(&self) -> u32 {
        match *self {
            NavKey::Cell { row, col } => row as u32 * GRID_SIZE as u32 + col as u32,
            NavKey::Back => (GRID_SIZE * GRID_SIZE) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_layout_matches_keypad() {
        assert_eq!(
            NavKey::from_scan_code(SC_NUMPAD7),
            Some(NavKey::Cell { row: 0, col: 0 })
        );
        assert_eq!(
            NavKey::from_scan_code(SC_NUMPAD9),
            Some(NavKey::Cell { row: 0, col: 2 })
        );
        assert_eq!(
            NavKey::from_scan_code(SC_NUMPAD5),
            Some(NavKey::Cell { row: 1, col: 1 })
        );
        assert_eq!(
            NavKey::from_scan_code(SC_NUMPAD1),
            Some(NavKey::Cell { row: 2, col: 0 })
        );
        assert_eq!(
            NavKey::from_scan_code(SC_NUMPAD3),
            Some(NavKey::Cell { row: 2, col: 2 })
        );
        assert_eq!(NavKey::from_scan_code(SC_NUMPAD0), Some(NavKey::Back));
    }

    #[test]
    fn test_irrelevant_codes() {
        // Numpad minus, plus, decimal, and the letter A.
        for code in [0x4A, 0x4E, 0x53, 0x1E, 0] {
            assert_eq!(NavKey::from_scan_code(code), None, "{code:#x}");
        }
    }

    #[test]
    fn test_scan_code_inverse_and_unique_indices() {
        let mut seen = 0u32;
        for code in [
            SC_NUMPAD0, SC_NUMPAD1, SC_NUMPAD2, SC_NUMPAD3, SC_NUMPAD4, SC_NUMPAD5, SC_NUMPAD6,
            SC_NUMPAD7, SC_NUMPAD8, SC_NUMPAD9,
        ] {
            let key = NavKey::from_scan_code(code).unwrap();
            assert_eq!(key.scan_code(), code);
            assert_eq!(seen & (1 << key.index()), 0);
            seen |= 1 << key.index();
        }
        assert_eq!(seen, 0x3FF);
    }
}
