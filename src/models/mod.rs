mod input_method;
mod meter;
mod meter_type;
mod reading;

pub use input_method::InputMethod;
pub use meter::{LatestReading, Meter, MeterUpdate, MeterWithLatestReading, NewMeter};
pub use meter_type::MeterType;
pub use reading::{
    NewReading, PaginatedReadings, Pagination, Reading, ReadingFilters, ReadingStatistics,
    ReadingUpdate, ReadingWithMeter, MAX_PAGE_LIMIT,
};
