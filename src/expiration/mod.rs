mod cleaner;

pub use cleaner::start_housekeeping;
