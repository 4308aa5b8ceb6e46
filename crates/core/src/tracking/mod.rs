pub mod track_aggregator;
