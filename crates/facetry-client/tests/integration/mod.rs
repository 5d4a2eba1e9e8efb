mod cancellation;
mod end_to_end;
mod paging;
mod query_cache;
