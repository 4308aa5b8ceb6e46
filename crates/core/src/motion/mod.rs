pub mod motion_gate;
