pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, error, food_line, header, info, muted, section, status, success, summary_row, warn};
pub use table::{cache_table, foods_table, meal_table, nutrients_table, stats_table, TableBuilder};
pub use theme::{theme, Theme};
