mod postgres_tests;
mod scenario_tests;
