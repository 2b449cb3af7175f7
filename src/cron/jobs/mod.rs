pub mod drain_counter_outbox;
