mod bootstrap_test;
mod live_sync_test;
