/// Platform primitive that keeps the device awake while work is in flight.
pub trait WakeRetention: Send + Sync {
    fn hold(&self);
    fn release(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetention;

impl WakeRetention for NoRetention {
    fn hold(&self) {}
    fn release(&self) {}
}
