// Hardware drivers

pub mod serial;
pub mod timer;
