//! Core domain types: roles, coordinates, piece identifiers and the board.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Seat in a match. Fixed for the lifetime of the match.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Holds the first turn.
    Player1,
    /// Moves second.
    Player2,
}

impl Role {
    /// Returns the other seat.
    pub fn opponent(self) -> Self {
        match self {
            Role::Player1 => Role::Player2,
            Role::Player2 => Role::Player1,
        }
    }

    /// Rank direction this role advances in (+1 for player1, -1 for player2).
    pub fn forward(self) -> i8 {
        match self {
            Role::Player1 => 1,
            Role::Player2 => -1,
        }
    }
}

/// Error produced when a coordinate string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum CoordError {
    /// Empty input.
    #[display("Empty coordinate")]
    Empty,
    /// The file letter is not A-Z.
    #[display("Invalid file in coordinate '{}'", _0)]
    File(String),
    /// The rank is missing, zero or not a number.
    #[display("Invalid rank in coordinate '{}'", _0)]
    Rank(String),
}

impl std::error::Error for CoordError {}

/// A square on the board in algebraic form, e.g. `E7`.
///
/// Files are letters starting at `A` (index 0); ranks start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coord {
    file: u8,
    rank: u8,
}

impl Coord {
    /// Creates a coordinate from a zero-based file index and a one-based rank.
    pub fn new(file: u8, rank: u8) -> Self {
        Self { file, rank }
    }

    /// Zero-based file index (`A` = 0).
    pub fn file(&self) -> u8 {
        self.file
    }

    /// One-based rank.
    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// Shifts the coordinate by a file/rank delta.
    ///
    /// Returns `None` when the result falls off the low edge of the board.
    /// Upper bounds are a property of the rule table, not of coordinates.
    pub fn offset(&self, df: i8, dr: i8) -> Option<Self> {
        let file = i16::from(self.file) + i16::from(df);
        let rank = i16::from(self.rank) + i16::from(dr);
        if !(0..26).contains(&file) || !(1..=99).contains(&rank) {
            return None;
        }
        Some(Self::new(file as u8, rank as u8))
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'A' + self.file) as char, self.rank)
    }
}

impl FromStr for Coord {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars.next().ok_or(CoordError::Empty)?;
        if !letter.is_ascii_alphabetic() {
            return Err(CoordError::File(s.to_string()));
        }
        let file = letter.to_ascii_uppercase() as u8 - b'A';
        let rank: u8 = chars
            .as_str()
            .parse()
            .map_err(|_| CoordError::Rank(s.to_string()))?;
        if rank == 0 || rank > 99 {
            return Err(CoordError::Rank(s.to_string()));
        }
        Ok(Self::new(file, rank))
    }
}

impl TryFrom<String> for Coord {
    type Error = CoordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Coord> for String {
    fn from(coord: Coord) -> Self {
        coord.to_string()
    }
}

/// Unique identifier of a piece for the whole match.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct PieceId(String);

impl PieceId {
    /// Creates a piece identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PieceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Board state: piece identifier to coordinate.
///
/// A piece missing from the map has been captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    pieces: BTreeMap<PieceId, Coord>,
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the coordinate of a piece, if it is still on the board.
    pub fn position_of(&self, piece: &PieceId) -> Option<Coord> {
        self.pieces.get(piece).copied()
    }

    /// Returns the piece standing on a coordinate.
    pub fn piece_at(&self, coord: &Coord) -> Option<&PieceId> {
        self.pieces
            .iter()
            .find(|(_, at)| *at == coord)
            .map(|(id, _)| id)
    }

    /// Checks whether a coordinate is free.
    pub fn is_empty(&self, coord: &Coord) -> bool {
        self.piece_at(coord).is_none()
    }

    /// Puts a piece on a coordinate (or moves it there).
    pub fn place(&mut self, piece: PieceId, coord: Coord) {
        self.pieces.insert(piece, coord);
    }

    /// Removes a piece, returning its last coordinate.
    pub fn remove(&mut self, piece: &PieceId) -> Option<Coord> {
        self.pieces.remove(piece)
    }

    /// Iterates over all pieces on the board.
    pub fn pieces(&self) -> impl Iterator<Item = (&PieceId, &Coord)> {
        self.pieces.iter()
    }

    /// Number of pieces on the board.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Checks whether the board holds no pieces.
    pub fn is_board_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

impl FromIterator<(PieceId, Coord)> for Board {
    fn from_iter<T: IntoIterator<Item = (PieceId, Coord)>>(iter: T) -> Self {
        Self {
            pieces: iter.into_iter().collect(),
        }
    }
}

/// Lifetime move counter per piece, consumed by the rule oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveCounts(BTreeMap<PieceId, u32>);

impl MoveCounts {
    /// Number of actions the piece has taken.
    pub fn get(&self, piece: &PieceId) -> u32 {
        self.0.get(piece).copied().unwrap_or(0)
    }

    /// Records one more action for the piece.
    pub fn increment(&mut self, piece: &PieceId) {
        *self.0.entry(piece.clone()).or_insert(0) += 1;
    }

    /// Keeps the larger count per piece.
    pub fn merge_max(&mut self, other: &MoveCounts) {
        for (piece, count) in &other.0 {
            let entry = self.0.entry(piece.clone()).or_insert(0);
            *entry = (*entry).max(*count);
        }
    }

    /// Iterates over pieces with a recorded count.
    pub fn iter(&self) -> impl Iterator<Item = (&PieceId, u32)> {
        self.0.iter().map(|(piece, count)| (piece, *count))
    }
}

impl FromIterator<(PieceId, u32)> for MoveCounts {
    fn from_iter<T: IntoIterator<Item = (PieceId, u32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Has-moved flags, one per piece. Flags only ever go from false to true.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovedFlags(BTreeSet<PieceId>);

impl MovedFlags {
    /// Whether the piece has made its first move.
    pub fn has_moved(&self, piece: &PieceId) -> bool {
        self.0.contains(piece)
    }

    /// Marks the piece as moved.
    pub fn mark(&mut self, piece: &PieceId) {
        self.0.insert(piece.clone());
    }

    /// Adds every flag set in `other`. Never clears a flag.
    pub fn absorb(&mut self, other: &MovedFlags) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Checks that every flag in `earlier` is still set here.
    pub fn covers(&self, earlier: &MovedFlags) -> bool {
        earlier.0.is_subset(&self.0)
    }

    /// Number of pieces flagged.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks whether no piece has moved yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over flagged pieces.
    pub fn iter(&self) -> impl Iterator<Item = &PieceId> {
        self.0.iter()
    }
}

impl FromIterator<PieceId> for MovedFlags {
    fn from_iter<T: IntoIterator<Item = PieceId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
