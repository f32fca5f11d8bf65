// SPDX-License-Identifier: CEPL-1.0
//! Adapter selection and the logical device.

use std::{ffi::CStr, sync::Arc};

use ash::{khr::swapchain, vk};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, VkError, VkResultExt},
    instance::Instance,
};

pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

/// Adapters scoring below this are unusable.
pub const SCORE_EPSILON: f32 = 1e-7;

/// Adapters at or above this API version get a small bonus.
pub const PREFERRED_API_VERSION: u32 = vk::API_VERSION_1_3;

const API_VERSION_BONUS: f32 = 1.1;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    pub flags: vk::QueueFlags,
    /// Can present to the target surface.
    pub present: bool,
}

impl QueueFamilyCaps {
    fn has(&self, bits: vk::QueueFlags) -> bool {
        self.flags.contains(bits)
    }
}

/// Resolved queue family indices. Any of them may coincide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Returns `None` when there is no graphics family or nothing can present.
    pub fn resolve(families: &[QueueFamilyCaps]) -> Option<Self> {
        let find = |pred: fn(&QueueFamilyCaps) -> bool| {
            families.iter().position(pred).map(|i| i as u32)
        };

        let graphics = find(|f| f.has(vk::QueueFlags::GRAPHICS) && f.present)
            .or_else(|| find(|f| f.has(vk::QueueFlags::GRAPHICS)))?;
        let present = if families[graphics as usize].present {
            graphics
        } else {
            find(|f| f.present)?
        };
        let compute = find(|f| f.has(vk::QueueFlags::COMPUTE) && !f.has(vk::QueueFlags::GRAPHICS))
            .or_else(|| find(|f| f.has(vk::QueueFlags::COMPUTE)))
            .unwrap_or(graphics);
        // Graphics and compute families implicitly support transfer.
        let transfer = find(|f| {
            f.has(vk::QueueFlags::TRANSFER)
                && !f.has(vk::QueueFlags::GRAPHICS)
                && !f.has(vk::QueueFlags::COMPUTE)
        })
        .or_else(|| find(|f| f.has(vk::QueueFlags::TRANSFER)))
        .unwrap_or(graphics);

        Some(QueueFamilyIndices {
            graphics,
            present,
            compute,
            transfer,
        })
    }

    /// Distinct family indices, sorted; one queue create request each.
    pub fn unique(&self) -> Vec<u32> {
        let mut v = vec![self.graphics, self.present, self.compute, self.transfer];
        v.sort_unstable();
        v.dedup();
        v
    }
}

/// Everything adapter scoring looks at.
#[derive(Clone, Debug)]
pub struct AdapterReport {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub queue_families: Option<QueueFamilyIndices>,
    pub missing_extensions: Vec<String>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
    pub sampler_anisotropy: bool,
}

pub fn score_adapter(report: &AdapterReport) -> f32 {
    let usable = report.queue_families.is_some()
        && report.missing_extensions.is_empty()
        && report.surface_format_count > 0
        && report.present_mode_count > 0
        && report.sampler_anisotropy;
    if !usable {
        return 0.0;
    }

    let mut score = match report.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000.0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100.0,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10.0,
        vk::PhysicalDeviceType::CPU => 0.0,
        _ => 1.0,
    };
    if report.api_version >= PREFERRED_API_VERSION {
        score *= API_VERSION_BONUS;
    }
    score
}

/// Index of the best adapter. Equal scores keep the earlier one.
pub fn pick_best_adapter(reports: &[AdapterReport]) -> Result<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, r) in reports.iter().enumerate() {
        let s = score_adapter(r);
        debug!("adapter {} '{}' scored {s}", i, r.name);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    match best {
        None => Err(VkError::NoAdapters),
        Some((_, s)) if s < SCORE_EPSILON => Err(VkError::NoSuitableAdapter { best: s }),
        Some((i, _)) => Ok(i),
    }
}

/// First candidate the predicate accepts.
pub fn pick_depth_format(supported: impl Fn(vk::Format) -> bool) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES.into_iter().find(|&f| supported(f))
}

pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0 && props.memory_types[i as usize].property_flags.contains(flags)
    })
}

/// Highest supported count not above `requested`.
pub fn clamp_sample_count(requested: u32, supported: vk::SampleCountFlags) -> vk::SampleCountFlags {
    [64, 32, 16, 8, 4, 2]
        .into_iter()
        .filter(|&n| n <= requested)
        .map(vk::SampleCountFlags::from_raw)
        .find(|&f| supported.contains(f))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

pub struct Device {
    instance: Arc<Instance>,
    physical: vk::PhysicalDevice,
    raw: ash::Device,
    swapchain_loader: swapchain::Device,

    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,

    queue_families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: vk::Queue,
    transfer_queue: vk::Queue,

    command_pool: vk::CommandPool,
    depth_format: vk::Format,
}

impl Device {
    /// Scores every adapter against the instance's surface and opens the best.
    pub fn new(instance: Arc<Instance>) -> Result<Arc<Self>> {
        let inst = instance.raw();
        let adapters = unsafe { inst.enumerate_physical_devices() }
            .check("vkEnumeratePhysicalDevices")?;

        let mut reports = Vec::with_capacity(adapters.len());
        for &phys in &adapters {
            reports.push(unsafe { query_adapter(&instance, phys)? });
        }
        let best = pick_best_adapter(&reports)?;
        let physical = adapters[best];
        let report = &reports[best];
        let Some(queue_families) = report.queue_families else {
            return Err(VkError::NoSuitableAdapter { best: 0.0 });
        };
        info!(
            "adapter: {} ({:?}), score {:.1}",
            report.name,
            report.device_type,
            score_adapter(report)
        );
        info!("queue families: {:?}", queue_families);

        let raw = unsafe { create_logical_device(inst, physical, &queue_families)? };

        let properties = unsafe { inst.get_physical_device_properties(physical) };
        let memory_properties = unsafe { inst.get_physical_device_memory_properties(physical) };

        let (graphics_queue, present_queue, compute_queue, transfer_queue) = unsafe {
            (
                raw.get_device_queue(queue_families.graphics, 0),
                raw.get_device_queue(queue_families.present, 0),
                raw.get_device_queue(queue_families.compute, 0),
                raw.get_device_queue(queue_families.transfer, 0),
            )
        };

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: queue_families.graphics,
            ..Default::default()
        };
        let command_pool = match unsafe { raw.create_command_pool(&pool_info, None) } {
            Ok(p) => p,
            Err(code) => {
                unsafe { raw.destroy_device(None) };
                return Err(VkError::driver("vkCreateCommandPool", code));
            }
        };

        let depth_format = pick_depth_format(|f| {
            let props = unsafe { inst.get_physical_device_format_properties(physical, f) };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        });
        let Some(depth_format) = depth_format else {
            unsafe {
                raw.destroy_command_pool(command_pool, None);
                raw.destroy_device(None);
            }
            return Err(VkError::NoDepthFormat);
        };
        info!("depth format {:?}", depth_format);

        let swapchain_loader = swapchain::Device::new(inst, &raw);

        Ok(Arc::new(Device {
            instance,
            physical,
            raw,
            swapchain_loader,
            properties,
            memory_properties,
            queue_families,
            graphics_queue,
            present_queue,
            compute_queue,
            transfer_queue,
            command_pool,
            depth_format,
        }))
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn physical(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    pub fn swapchain_loader(&self) -> &swapchain::Device {
        &self.swapchain_loader
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn memory_type_index(&self, type_bits: u32, flags: vk::MemoryPropertyFlags) -> Result<u32> {
        find_memory_type(&self.memory_properties, type_bits, flags)
            .ok_or(VkError::NoMemoryType { type_bits, flags })
    }

    /// Requested MSAA count clamped to what both color and depth targets support.
    pub fn usable_sample_count(&self, requested: u32) -> vk::SampleCountFlags {
        let limits = &self.properties.limits;
        let supported =
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
        let samples = clamp_sample_count(requested, supported);
        if samples.as_raw() != requested {
            warn!("sample count {requested} not supported, using {:?}", samples);
        }
        samples
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw.device_wait_idle() }.check("vkDeviceWaitIdle")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            self.raw.destroy_command_pool(self.command_pool, None);
            self.raw.destroy_device(None);
        }
    }
}

unsafe fn query_adapter(instance: &Instance, phys: vk::PhysicalDevice) -> Result<AdapterReport> {
    let inst = instance.raw();
    let props = unsafe { inst.get_physical_device_properties(phys) };
    let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let families = unsafe { inst.get_physical_device_queue_family_properties(phys) };
    let mut caps = Vec::with_capacity(families.len());
    for (i, q) in families.iter().enumerate() {
        caps.push(QueueFamilyCaps {
            flags: q.queue_flags,
            present: instance.supports_present(phys, i as u32)?,
        });
    }

    let available = unsafe { inst.enumerate_device_extension_properties(phys) }
        .check("vkEnumerateDeviceExtensionProperties")?;
    let missing_extensions = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .filter(|&&req| {
            !available
                .iter()
                .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == req)
        })
        .map(|req| req.to_string_lossy().into_owned())
        .collect();

    let support = instance.surface_support(phys)?;
    let features = unsafe { inst.get_physical_device_features(phys) };

    Ok(AdapterReport {
        name,
        device_type: props.device_type,
        api_version: props.api_version,
        queue_families: QueueFamilyIndices::resolve(&caps),
        missing_extensions,
        surface_format_count: support.formats.len(),
        present_mode_count: support.present_modes.len(),
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
    })
}

unsafe fn create_logical_device(
    instance: &ash::Instance,
    physical: vk::PhysicalDevice,
    families: &QueueFamilyIndices,
) -> Result<ash::Device> {
    let priorities = [1.0f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let extensions: Vec<_> = REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        ..Default::default()
    };

    let info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    unsafe { instance.create_device(physical, &info, None) }.check("vkCreateDevice")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, present: bool) -> QueueFamilyCaps {
        QueueFamilyCaps { flags, present }
    }

    fn good_adapter(device_type: vk::PhysicalDeviceType) -> AdapterReport {
        AdapterReport {
            name: "test".into(),
            device_type,
            api_version: vk::API_VERSION_1_2,
            queue_families: Some(QueueFamilyIndices {
                graphics: 0,
                present: 0,
                compute: 0,
                transfer: 0,
            }),
            missing_extensions: Vec::new(),
            surface_format_count: 2,
            present_mode_count: 1,
            sampler_anisotropy: true,
        }
    }

    #[test]
    fn discrete_beats_integrated_beats_cpu() {
        let d = score_adapter(&good_adapter(vk::PhysicalDeviceType::DISCRETE_GPU));
        let i = score_adapter(&good_adapter(vk::PhysicalDeviceType::INTEGRATED_GPU));
        let c = score_adapter(&good_adapter(vk::PhysicalDeviceType::CPU));
        assert!(d > i && i > c);
        assert_eq!(c, 0.0);
    }

    #[test]
    fn cpu_only_host_is_fatal() {
        let mut cpu = good_adapter(vk::PhysicalDeviceType::CPU);
        cpu.api_version = vk::make_api_version(0, 1, 3, 0);
        assert_eq!(score_adapter(&cpu), 0.0);
        assert!(matches!(
            pick_best_adapter(&[cpu.clone()]),
            Err(VkError::NoSuitableAdapter { .. })
        ));
        let gpu = good_adapter(vk::PhysicalDeviceType::OTHER);
        assert_eq!(pick_best_adapter(&[cpu, gpu]).unwrap(), 1);
    }

    #[test]
    fn any_missing_requirement_zeroes_score() {
        let base = good_adapter(vk::PhysicalDeviceType::DISCRETE_GPU);

        let mut r = base.clone();
        r.queue_families = None;
        assert_eq!(score_adapter(&r), 0.0);

        let mut r = base.clone();
        r.missing_extensions = vec!["VK_KHR_swapchain".into()];
        assert_eq!(score_adapter(&r), 0.0);

        let mut r = base.clone();
        r.surface_format_count = 0;
        assert_eq!(score_adapter(&r), 0.0);

        let mut r = base.clone();
        r.present_mode_count = 0;
        assert_eq!(score_adapter(&r), 0.0);

        let mut r = base;
        r.sampler_anisotropy = false;
        assert_eq!(score_adapter(&r), 0.0);
    }

    #[test]
    fn newer_api_breaks_ties() {
        let old = good_adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        let mut new = old.clone();
        new.api_version = vk::make_api_version(0, 1, 3, 250);
        assert!(score_adapter(&new) > score_adapter(&old));
        assert_eq!(pick_best_adapter(&[old, new]).unwrap(), 1);
    }

    #[test]
    fn pick_prefers_highest_and_keeps_first_on_tie() {
        let a = good_adapter(vk::PhysicalDeviceType::INTEGRATED_GPU);
        let b = good_adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        let c = good_adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        assert_eq!(pick_best_adapter(&[a, b, c]).unwrap(), 1);
    }

    #[test]
    fn no_adapters_is_fatal() {
        assert!(matches!(pick_best_adapter(&[]), Err(VkError::NoAdapters)));
    }

    #[test]
    fn only_unusable_adapters_is_fatal() {
        let mut r = good_adapter(vk::PhysicalDeviceType::DISCRETE_GPU);
        r.sampler_anisotropy = false;
        assert!(matches!(
            pick_best_adapter(&[r]),
            Err(VkError::NoSuitableAdapter { .. })
        ));
    }

    #[test]
    fn graphics_family_with_present_is_preferred() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
        ];
        let q = QueueFamilyIndices::resolve(&fams).unwrap();
        assert_eq!((q.graphics, q.present), (1, 1));
    }

    #[test]
    fn separate_present_family_is_found() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER, true),
        ];
        let q = QueueFamilyIndices::resolve(&fams).unwrap();
        assert_eq!((q.graphics, q.present), (0, 1));
        assert_eq!(q.unique(), vec![0, 1]);
    }

    #[test]
    fn dedicated_compute_and_transfer_are_preferred() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER | vk::QueueFlags::SPARSE_BINDING, false),
        ];
        let q = QueueFamilyIndices::resolve(&fams).unwrap();
        assert_eq!(q.graphics, 0);
        assert_eq!(q.compute, 1);
        assert_eq!(q.transfer, 2);
        assert_eq!(q.unique(), vec![0, 1, 2]);
    }

    #[test]
    fn single_family_dedupes_to_one_request() {
        let fams = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            true,
        )];
        let q = QueueFamilyIndices::resolve(&fams).unwrap();
        assert_eq!(q.unique(), vec![0]);
    }

    #[test]
    fn no_present_or_graphics_is_unresolvable() {
        assert!(QueueFamilyIndices::resolve(&[family(vk::QueueFlags::GRAPHICS, false)]).is_none());
        assert!(QueueFamilyIndices::resolve(&[family(vk::QueueFlags::COMPUTE, true)]).is_none());
        assert!(QueueFamilyIndices::resolve(&[]).is_none());
    }

    #[test]
    fn depth_probe_follows_preference_order() {
        let only_d24 = |f: vk::Format| f == vk::Format::D24_UNORM_S8_UINT || f == vk::Format::D16_UNORM;
        assert_eq!(pick_depth_format(only_d24), Some(vk::Format::D24_UNORM_S8_UINT));
        assert_eq!(pick_depth_format(|_| true), Some(vk::Format::D32_SFLOAT_S8_UINT));
        assert_eq!(pick_depth_format(|_| false), None);
    }

    #[test]
    fn stencil_formats_get_stencil_aspect() {
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn memory_type_needs_bit_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;

        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        assert_eq!(find_memory_type(&props, 0b111, local), Some(1));
        assert_eq!(find_memory_type(&props, 0b101, local), Some(2));
        assert_eq!(find_memory_type(&props, 0b001, local), None);
    }

    #[test]
    fn sample_count_clamps_down_to_supported() {
        let supported = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(clamp_sample_count(8, supported), vk::SampleCountFlags::TYPE_4);
        assert_eq!(clamp_sample_count(2, supported), vk::SampleCountFlags::TYPE_2);
        assert_eq!(clamp_sample_count(1, supported), vk::SampleCountFlags::TYPE_1);
    }
}
