pub mod config;
pub mod csv;
pub mod db;
pub mod gateway;
pub mod places;
pub mod services;
pub mod web;
pub mod whatsapp;
