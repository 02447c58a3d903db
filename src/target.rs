// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The catalog of supported back-end targets.

use crate::{Error, Result};

/// Which shading API a target emits code for.
///
/// The discriminant order is the sort key used to establish a deterministic
/// target processing order, independent of the order targets were requested
/// in on the command line.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Api {
    Gl,
    Vulkan,
    Metal,
}

/// Whether a target is a desktop or a mobile flavor of its API.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PlatformClass {
    Desktop,
    Mobile,
}

/// An immutable description of one output flavor.
#[derive(Copy, Clone, Debug)]
pub struct Target {
    pub api: Api,
    pub platform: PlatformClass,
    pub version_major: u32,
    pub version_minor: u32,
    /// Extension for translated shader files, without the leading dot.
    pub file_ext: &'static str,
}

/// A catalog entry: a target plus the name it is requested by.
#[derive(Copy, Clone, Debug)]
pub struct NamedTarget {
    pub name: &'static str,
    pub target: Target,
}

const fn gl(platform: PlatformClass, major: u32, minor: u32) -> Target {
    Target {
        api: Api::Gl,
        platform,
        version_major: major,
        version_minor: minor,
        file_ext: "glsl",
    }
}

const fn msl(platform: PlatformClass, major: u32, minor: u32) -> Target {
    Target {
        api: Api::Metal,
        platform,
        version_major: major,
        version_minor: minor,
        file_ext: "msl",
    }
}

/// Every target this tool can emit, in catalog order.
pub const TARGETS: &[NamedTarget] = &[
    NamedTarget {
        name: "gl430",
        target: gl(PlatformClass::Desktop, 4, 3),
    },
    NamedTarget {
        name: "gles310",
        target: gl(PlatformClass::Mobile, 3, 1),
    },
    NamedTarget {
        name: "gles300",
        target: gl(PlatformClass::Mobile, 3, 0),
    },
    NamedTarget {
        name: "msl10",
        target: msl(PlatformClass::Desktop, 1, 0),
    },
    NamedTarget {
        name: "msl11",
        target: msl(PlatformClass::Desktop, 1, 1),
    },
    NamedTarget {
        name: "msl12",
        target: msl(PlatformClass::Desktop, 1, 2),
    },
    NamedTarget {
        name: "msl20",
        target: msl(PlatformClass::Desktop, 2, 0),
    },
    NamedTarget {
        name: "msl10ios",
        target: msl(PlatformClass::Mobile, 1, 0),
    },
    NamedTarget {
        name: "msl11ios",
        target: msl(PlatformClass::Mobile, 1, 1),
    },
    NamedTarget {
        name: "msl12ios",
        target: msl(PlatformClass::Mobile, 1, 2),
    },
    NamedTarget {
        name: "msl20ios",
        target: msl(PlatformClass::Mobile, 2, 0),
    },
    NamedTarget {
        name: "spv",
        target: Target {
            api: Api::Vulkan,
            platform: PlatformClass::Desktop,
            version_major: 1,
            version_minor: 0,
            file_ext: "spv",
        },
    },
];

/// Looks a target up by its exact catalog name.
pub fn find(name: &str) -> Result<&'static NamedTarget> {
    TARGETS
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| Error::UnknownTarget(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_targets() {
        assert_eq!(find("gl430").unwrap().target.api, Api::Gl);
        assert_eq!(find("spv").unwrap().target.api, Api::Vulkan);
        let msl20ios = find("msl20ios").unwrap().target;
        assert_eq!(msl20ios.api, Api::Metal);
        assert_eq!(msl20ios.platform, PlatformClass::Mobile);
        assert_eq!((msl20ios.version_major, msl20ios.version_minor), (2, 0));
    }

    #[test]
    fn lookup_unknown_target_fails() {
        assert!(matches!(find("dx12"), Err(Error::UnknownTarget(_))));
    }

    #[test]
    fn api_order_sorts_gl_before_vulkan_before_metal() {
        assert!(Api::Gl < Api::Vulkan);
        assert!(Api::Vulkan < Api::Metal);
    }
}
