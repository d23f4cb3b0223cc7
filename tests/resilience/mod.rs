mod backoff;
mod retriable_operation;
