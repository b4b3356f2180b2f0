//! Pure canonicalization of league codes, series labels and club names.

pub mod club;
pub mod league;
pub mod series;

pub use club::{canonicalize_club_name, similar_club};
pub use league::normalize_league_id;
pub use series::{extract_club_name, extract_series_name, split_team_name};
