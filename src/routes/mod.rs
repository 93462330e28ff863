pub mod web_vitals;
