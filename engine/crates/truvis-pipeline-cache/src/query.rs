pub mod timer_query;
