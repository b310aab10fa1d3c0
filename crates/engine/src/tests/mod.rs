mod failure_tests;
mod helpers;
