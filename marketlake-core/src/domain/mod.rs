//! Typed rows for every logical series, with conversions to and from frames.

pub mod bar;
pub mod entity;
pub mod news;
pub mod tick;

pub use bar::DailyBar;
pub use entity::EntityMeta;
pub use news::NewsItem;
pub use tick::PriceTick;
