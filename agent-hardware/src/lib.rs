// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces to the devices the platform attaches to this instance.

pub mod device_path;
pub mod fakes;
pub mod fs;

pub use device_path::{
    DevicePathResolver, IdentityDevicePathResolver, MappedDevicePathResolver,
    ResolveError,
};
