use crate::addr::Addr;

/// The process-wide symbol map: label/function-start lookup plus the mutations the
/// function manager needs to publish newly-discovered functions back to it. This
/// is an external primitive; the engine only ever sees it through this trait.
pub trait SymbolMap {
    /// Returns the address of the label at `addr`, if any is known.
    fn get_label_name(&self, addr: Addr) -> Option<String>;

    /// Returns the start address of the function containing `addr`, if known.
    fn get_function_start(&self, addr: Addr) -> Option<Addr>;

    fn add_function(&mut self, name: &str, address: Addr, size: u32);

    fn set_function_size(&mut self, address: Addr, size: u32);

    fn add_module(&mut self, name: &str, address: Addr, size: u32);
}
