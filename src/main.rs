//! rrsched-os kernel entry point
//!
//! Brings up the bootstrap processor, starts the scheduler, releases the
//! application processors and runs a few demonstration threads.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

// The kernel image is only built for bare-metal targets.
#[cfg(not(target_os = "none"))]
fn main() {}

#[cfg(target_os = "none")]
mod kernel {
    use core::fmt::Write;
    use core::panic::PanicInfo;

    use rrsched_os::arch::x86_64::{apic, halt_forever, RawSerial};
    use rrsched_os::boot::limine::{self, SmpInfo};
    use rrsched_os::config::CONFIG;
    use rrsched_os::drivers::{serial, timer};
    use rrsched_os::{gdt, interrupts, logger, mm, task};

    // ========================================================================
    // PANIC HANDLER - serial only
    // ========================================================================

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        x86_64::instructions::interrupts::disable();
        let _ = writeln!(RawSerial, "\n!!! KERNEL PANIC on processor {} !!!", apic::current_id());
        let _ = writeln!(RawSerial, "{}", info);
        let _ = writeln!(RawSerial, "System halted.");
        halt_forever()
    }

    // ========================================================================
    // KERNEL ENTRY POINT
    // ========================================================================

    #[no_mangle]
    pub extern "C" fn _start() -> ! {
        // Disable interrupts until the scheduler owns this processor
        x86_64::instructions::interrupts::disable();

        serial::init();
        serial::write("\n========================================\n");
        serial::write("       rrsched-os round-robin SMP        \n");
        serial::write("========================================\n");

        if !limine::base_revision_supported() {
            serial::write("FATAL: Limine base revision not supported\n");
            halt_forever();
        }

        logger::init(CONFIG.log_level);
        mm::init();

        gdt::init();
        interrupts::load_idt();
        interrupts::init_pics();
        log::info!("GDT, IDT and PIC ready");

        apic::set_available(limine::x2apic_enabled());
        apic::enable_local();
        let cpu_slots = if apic::is_enabled() {
            limine::cpu_slots()
        } else {
            log::warn!("x2APIC unavailable, running on the bootstrap processor only");
            1
        };

        if let Err(e) = task::init_bootstrap_processor(cpu_slots) {
            panic!("scheduler bootstrap failed: {}", e);
        }

        spawn_demo_threads();

        if apic::is_enabled() {
            let started = limine::start_application_processors(ap_main);
            log::info!("{} of {} processors released", started, limine::cpu_count());
        }

        timer::init();
        log::info!("PIT at {} Hz, enabling interrupts", CONFIG.timer_hz);
        x86_64::instructions::interrupts::enable();

        // From here on this flow is the bootstrap processor's idle thread.
        loop {
            x86_64::instructions::hlt();
        }
    }

    extern "C" fn ap_main(info: *const SmpInfo) -> ! {
        x86_64::instructions::interrupts::disable();

        gdt::init();
        interrupts::load_idt();
        apic::enable_local();

        if let Err(e) = task::init_application_processor() {
            let processor = unsafe { info.as_ref() }.map_or(0, |info| info.processor_id);
            log::error!("processor {} cannot join scheduling: {}", processor, e);
            halt_forever();
        }

        x86_64::instructions::interrupts::enable();

        // Idle thread of this processor
        loop {
            x86_64::instructions::hlt();
        }
    }

    // ========================================================================
    // DEMONSTRATION THREADS
    // ========================================================================

    fn spawn_demo_threads() {
        let ticker_b_cpu = limine::first_application_processor().filter(|_| apic::is_enabled());

        let spawned = task::spawn(short_lived)
            .and_then(|_| task::spawn(ticker_a))
            .and_then(|_| match ticker_b_cpu {
                Some(cpu) => task::spawn_on(ticker_b, cpu),
                None => task::spawn(ticker_b),
            })
            .and_then(|_| task::spawn(lock_holder));

        match spawned {
            Ok(_) => log::info!("{} threads registered", task::thread_count()),
            Err(e) => log::error!("failed to start demo threads: {}", e),
        }
    }

    /// Returns at once, so it exercises the exit path.
    extern "C" fn short_lived() {
        log::info!("short-lived thread running");
    }

    extern "C" fn ticker_a() {
        loop {
            log::info!("A: uptime {} ms", timer::uptime_ms());
            task::sleep(500);
        }
    }

    extern "C" fn ticker_b() {
        loop {
            log::info!("B: uptime {} ms", timer::uptime_ms());
            task::sleep(750);
        }
    }

    extern "C" fn lock_holder() {
        loop {
            task::sleep(2000);
            if !task::can_lock() {
                continue;
            }
            task::lock();
            log::info!("holding the cross-processor lock, {} threads registered", task::thread_count());
            task::unlock();
        }
    }
}
