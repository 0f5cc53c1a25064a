pub mod cpu;
pub mod cpuinfo;
pub mod memory;
pub mod wtmp;
