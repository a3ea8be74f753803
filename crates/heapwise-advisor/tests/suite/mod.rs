mod concurrency;
mod support;
