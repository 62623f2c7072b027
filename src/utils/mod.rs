mod maths_utils;
mod perf;
mod time_utils;

pub use time_utils::{
    TimeUtils, epoch_ms_to_date_string, local_hour_and_weekday, now_timestamp_ms,
};

pub use maths_utils::{approx_eq_rel, dot, l2_norm, mean_and_stddev, solve_spd};
pub(crate) use maths_utils::argmin;
