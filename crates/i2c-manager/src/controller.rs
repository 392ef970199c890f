/// Register-level access to a two-wire bus controller in master mode.
///
/// The controller raises one interrupt per bus phase and reports the phase
/// through [`status`](Self::status). Every method is called either from the
/// interrupt front-end or from task context inside the manager's critical
/// section, never from both at once.
pub trait Controller {
    /// One-time bring-up: master mode on, stale interrupt cleared, interrupt
    /// line routed and unmasked.
    fn enable(&mut self);

    /// Whether the controller is asserting its serial interrupt flag.
    fn interrupt_pending(&mut self) -> bool;

    /// Phase-status code of the phase that just completed.
    fn status(&mut self) -> u8;

    /// Request a (repeated) start condition.
    fn start(&mut self);

    /// Drop the start request once the start condition went out.
    fn clear_start(&mut self);

    /// Request a stop condition.
    fn stop(&mut self);

    /// Acknowledge (`true`) or refuse (`false`) the next received byte.
    fn set_ack(&mut self, ack: bool);

    /// Load the data register for transmission.
    fn write(&mut self, byte: u8);

    /// Read the last received byte.
    fn read(&mut self) -> u8;

    /// Clear the interrupt flag so the controller runs the next phase.
    fn clear_interrupt(&mut self);

    /// Gate the controller's interrupt at the interrupt controller.
    fn mask_interrupt(&mut self) {}

    /// Re-open the controller's interrupt at the interrupt controller.
    fn unmask_interrupt(&mut self) {}

    /// Acknowledge the interrupt at the interrupt controller.
    fn end_of_interrupt(&mut self) {}
}
