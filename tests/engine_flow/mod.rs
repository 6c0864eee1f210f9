mod engine_test;
