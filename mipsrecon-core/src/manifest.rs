//! The manifest document: memory layout and pre-known symbols, loaded
//! once at `new_document` time. JSON (`serde`/`serde_json`) here, rather than YAML,
//! since the surrounding crates already reach for `serde_json` for structured data.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Segment {
    pub addr: u32,
    pub size: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleHeader {
    pub name: String,
    pub segments: Vec<Segment>,
    pub entry_addr: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub nm: ModuleHeader,
    #[serde(rename = "textStart")]
    pub text_start: u32,
    #[serde(rename = "textEnd")]
    pub text_end: u32,
    #[serde(rename = "modulePtr")]
    pub module_ptr: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub start: u32,
    pub size: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadedModule {
    pub name: String,
    pub address: u32,
    pub size: u32,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestFunction {
    pub name: String,
    pub address: u32,
    pub size: u32,
    #[serde(default)]
    pub bb_addresses: Vec<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HleFuncEntry {
    pub idx: u32,
    pub nid: u32,
    pub name: String,
    #[serde(default)]
    pub argmask: String,
    #[serde(default)]
    pub retmask: String,
    #[serde(default)]
    pub flags: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HleModuleEntry {
    pub name: String,
    pub funcs: Vec<HleFuncEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub module: ModuleInfo,
    pub memory: MemoryInfo,
    #[serde(default)]
    pub loaded_modules: Vec<LoadedModule>,
    #[serde(default)]
    pub functions: Vec<ManifestFunction>,
    #[serde(default)]
    pub hle_modules: Vec<HleModuleEntry>,
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_manifest() {
        let json = r#"{
            "module": {
                "nm": { "name": "main", "segments": [{"addr": 142622720, "size": 4096}], "entry_addr": 142622720 },
                "textStart": 142622720,
                "textEnd": 142626816,
                "modulePtr": 0
            },
            "memory": { "start": 142606336, "size": 33554432 },
            "loaded_modules": [{"name": "sceLibc", "address": 0, "size": 0, "isActive": true}],
            "functions": [{"name": "entry", "address": 142622720, "size": 32, "bb_addresses": [142622720]}],
            "hle_modules": [{"name": "SysMemUserForUser", "funcs": [
                {"idx": 0, "nid": 1, "name": "sceKernelSetCompiledSdkVersion380_390", "argmask": "x", "retmask": "i", "flags": 0}
            ]}]
        }"#;
        let m = Manifest::from_json(json).unwrap();
        assert_eq!(m.module.nm.name, "main");
        assert_eq!(m.loaded_modules[0].name, "sceLibc");
        assert_eq!(m.functions[0].bb_addresses, vec![142622720]);
        assert_eq!(m.hle_modules[0].funcs[0].argmask, "x");
    }
}
