pub mod geom;
pub mod record;
pub mod report;

pub use geom::Point;
