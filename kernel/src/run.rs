/*
 * Boot and Run Layer
 *
 * The port-facing surface of the kernel. A board brings the system up
 * with:
 *
 *   platform::install(&PORT);          // once, before anything else
 *   run::init();                       // gates, registries, services
 *   ...create and run the first application threads...
 *   run::start()?;                     // open the switch
 *   loop { run::main_loop_proc(); }    // kernel mode main loop
 *
 * and wires two interrupt handlers:
 *   - slice timer expiry   -> run::tick_handler()
 *   - switch interrupt     -> save registers, run::switch_handler(),
 *                             restore registers of the selected stack
 */

use crate::platform;
use crate::scheduler::{context, with_fos};
use crate::syscall::handlers::init_gates;
use crate::types::FosError;

/// Initialize the kernel: populate the system-call table, reset the
/// registries and arenas, provision the idle and file-service threads.
pub fn init() {
    init_gates();
    with_fos(|f| f.init());
    log::info!("fos {} ready", crate::version());
}

/// Enable the OS. After this, the first switch to user mode lands in
/// the current thread (the idle thread unless the embedder ran others).
pub fn start() -> Result<(), FosError> {
    with_fos(|f| f.start())
}

/// One kernel pass; call from the kernel-mode main loop.
pub fn main_loop_proc() {
    let now = platform::now_ms();
    with_fos(|f| f.main_loop_proc(now));
}

/// Slice-timer expiry: preempt the running thread.
pub fn tick_handler() {
    with_fos(|f| context::request_kernel_mode(&mut f.mgv, true));
}

/// Switch interrupt body, between the port's register save and restore.
pub fn switch_handler() {
    with_fos(|f| context::switch_context(&mut f.mgv));
}
