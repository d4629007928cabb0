mod column;
mod series;
pub use self::column::Column;
pub use self::series::SeriesPayload;
