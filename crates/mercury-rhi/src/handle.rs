// SPDX-License-Identifier: CEPL-1.0
//! Opaque handles into a backend's object tables.
//!
//! A handle is only meaningful to the backend that issued it. Each `create_*`
//! hands one out; the paired `destroy_*` retires it. Backends release anything
//! still live when they are dropped.

use slotmap::new_key_type;

new_key_type! { pub struct ShaderModuleHandle; }
new_key_type! { pub struct DescriptorSetLayoutHandle; }
new_key_type! { pub struct PipelineLayoutHandle; }
new_key_type! { pub struct RenderPassHandle; }
new_key_type! { pub struct FramebufferHandle; }
new_key_type! { pub struct PipelineHandle; }
new_key_type! { pub struct ImageViewHandle; }
new_key_type! { pub struct FenceHandle; }
new_key_type! { pub struct SemaphoreHandle; }
new_key_type! { pub struct CommandPoolHandle; }
new_key_type! { pub struct CommandBufferHandle; }
