pub mod attachment_encoder;
pub mod portal_controller;
pub mod portal_service;
pub mod session_gate;
