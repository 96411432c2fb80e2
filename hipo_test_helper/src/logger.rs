// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Captures log records so tests can assert on them.
//!
//! Call [`init`] before the code under test runs. Messages are kept per thread, so tests
//! running in parallel do not see each other's output.

use log::{LevelFilter, Log, Metadata, Record};
use std::{cell::RefCell, sync::Once};

thread_local! {
    static LOG_MESSAGES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

struct TestLogger;

impl Log for TestLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("{}", record.args());
            LOG_MESSAGES.with(|messages| messages.borrow_mut().push(message));
        }
    }

    fn flush(&self) {}
}

static TEST_LOGGER: TestLogger = TestLogger;
static INIT: Once = Once::new();

/// Install the capturing logger for the whole process and clear this thread's messages.
pub fn init() {
    INIT.call_once(|| {
        if log::set_logger(&TEST_LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    clear_log_messages();
}

pub fn clear_log_messages() {
    LOG_MESSAGES.with(|messages| messages.borrow_mut().clear());
}

/// Asserts that a message containing `expected` was logged on this thread.
#[track_caller]
pub fn assert_logged(expected: &str) {
    let found = LOG_MESSAGES.with(|messages| messages.borrow().iter().any(|m| m.contains(expected)));
    if !found {
        let logged = LOG_MESSAGES.with(|messages| messages.borrow().join("\n"));
        panic!("Expected '{expected}' in the log but it was not found. Logged:\n{logged}");
    }
}

/// Asserts that no message containing `unexpected` was logged on this thread.
#[track_caller]
pub fn assert_not_logged(unexpected: &str) {
    LOG_MESSAGES.with(|messages| {
        if let Some(m) = messages.borrow().iter().find(|m| m.contains(unexpected)) {
            panic!("Unexpected log message: '{m}'");
        }
    });
}
