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

//! Helpers shared by the tests of the `hipo` crate.

use std::fmt::{Debug, Display, Formatter};

pub mod logger;

/// Error type returned by tests so that `?` can be used on any displayable error.
///
/// Converting into it panics with the original message, which keeps the failure location and
/// text in the test output.
pub struct TestError;

impl Debug for TestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("TestError")
    }
}

impl<E: Display> From<E> for TestError {
    #[track_caller]
    fn from(e: E) -> Self {
        panic!("{}: {e}", std::any::type_name::<E>())
    }
}

/// Result type for tests, `TestResult` for tests returning nothing.
pub type TestResult<T = ()> = Result<T, TestError>;
