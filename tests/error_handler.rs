use std::sync::{Arc, Mutex};

use gdal_mem::config;
use gdal_mem::cpl::{self, CplErrType, CplErrorNum};
use gdal_mem::Driver;

#[test]
fn test_error_handler() {
    // We cannot test different error handler scenarios in parallel since we modify a global error handler.
    // Therefore, we test the error handler behavior sequentially to avoid data races.

    use_error_handler();

    quiet_handler_skips_callback();

    error_handler_interleaved();
}

type Records = Arc<Mutex<Vec<(CplErrType, i32, String)>>>;

fn collect_errors() -> Records {
    let errors: Records = Arc::new(Mutex::new(Vec::new()));
    let errors_clone = errors.clone();
    config::set_error_handler(move |a, b, c| {
        errors_clone.lock().unwrap().push((a, b, c.to_string()));
    });
    errors
}

fn use_error_handler() {
    let errors = collect_errors();

    cpl::error(CplErrType::Failure, CplErrorNum::AppDefined, "foo");
    cpl::warning("bar");

    // failures of the driver go through the same channel
    let dataset = Driver::mem().create("", 4, 4, 1).unwrap();
    assert!(dataset.rasterband(9).is_err());

    config::remove_error_handler();

    let result = errors.lock().unwrap().clone();
    assert_eq!(result.len(), 3);
    assert_eq!(result[0], (CplErrType::Failure, 1, "foo".to_string()));
    assert_eq!(result[1], (CplErrType::Warning, 1, "bar".to_string()));
    assert_eq!(result[2].0, CplErrType::Failure);
    assert_eq!(result[2].1, CplErrorNum::IllegalArg as i32);
    assert!(result[2].2.contains("band index 9"), "{}", result[2].2);

    let last = cpl::last_error().unwrap();
    assert_eq!(last.number, CplErrorNum::IllegalArg);
}

fn quiet_handler_skips_callback() {
    let errors = collect_errors();

    cpl::push_quiet_handler();
    cpl::error(CplErrType::Failure, CplErrorNum::NotSupported, "hidden");
    cpl::pop_quiet_handler();
    assert_eq!(cpl::last_error_msg(), "hidden");

    cpl::error(CplErrType::Failure, CplErrorNum::NotSupported, "shown");
    config::remove_error_handler();

    let result = errors.lock().unwrap().clone();
    assert_eq!(result, vec![(CplErrType::Failure, 6, "shown".to_string())]);
}

fn error_handler_interleaved() {
    use std::thread;
    // Two racing threads trying to set error handlers
    // First one
    thread::spawn(move || loop {
        config::set_error_handler(move |_a, _b, _c| {});
    });

    // Second one
    thread::spawn(move || loop {
        config::set_error_handler(move |_a, _b, _c| {});
    });

    // A thread that provokes potential race conditions
    let join_handle = thread::spawn(move || {
        for _ in 0..100 {
            cpl::error(CplErrType::Failure, CplErrorNum::AppDefined, "foo");
            cpl::warning("bar");
        }
    });

    join_handle.join().unwrap();
}
