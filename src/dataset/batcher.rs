//! Burn batchers collating sample records into tensors

use std::marker::PhantomData;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use super::records::{CanopySample, SeedSample};

/// A batch of canopy images
#[derive(Clone, Debug)]
pub struct CanopyBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for canopy classification batches
#[derive(Clone, Debug)]
pub struct CanopyBatcher<B: Backend> {
    image_size: usize,
    _backend: PhantomData<B>,
}

impl<B: Backend> CanopyBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, CanopySample, CanopyBatch<B>> for CanopyBatcher<B> {
    fn batch(&self, items: Vec<CanopySample>, device: &B::Device) -> CanopyBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CanopyBatch { images, targets }
    }
}

/// A batch of seed samples, every modality as its own tensor
#[derive(Clone, Debug)]
pub struct SeedBatch<B: Backend> {
    /// Spectra with shape [batch_size, spectral_length]
    pub spectra: Tensor<B, 2>,
    pub uav: Tensor<B, 2>,
    pub environment: Tensor<B, 2>,
    pub field: Tensor<B, 2>,
    pub storage: Tensor<B, 2>,
    /// Seed-Health-Index targets with shape [batch_size, 1]
    pub shi: Tensor<B, 2>,
    /// Aflatoxin-Risk-Score targets with shape [batch_size, 1]
    pub ars: Tensor<B, 2>,
}

/// Batcher for seed regression batches
#[derive(Clone, Debug, Default)]
pub struct SeedBatcher<B: Backend> {
    _backend: PhantomData<B>,
}

impl<B: Backend> SeedBatcher<B> {
    pub fn new() -> Self {
        Self {
            _backend: PhantomData,
        }
    }
}

fn stack_rows<B: Backend>(rows: Vec<&[f32]>, device: &B::Device) -> Tensor<B, 2> {
    let batch_size = rows.len();
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let data: Vec<f32> = rows.into_iter().flat_map(|r| r.iter().copied()).collect();
    Tensor::<B, 2>::from_floats(TensorData::new(data, [batch_size, width]), device)
}

impl<B: Backend> Batcher<B, SeedSample, SeedBatch<B>> for SeedBatcher<B> {
    fn batch(&self, items: Vec<SeedSample>, device: &B::Device) -> SeedBatch<B> {
        let batch_size = items.len();

        let spectra = stack_rows(items.iter().map(|s| s.spectrum.as_slice()).collect(), device);
        let uav = stack_rows(items.iter().map(|s| s.uav_features.as_slice()).collect(), device);
        let environment = stack_rows(
            items.iter().map(|s| s.environment_features.as_slice()).collect(),
            device,
        );
        let field = stack_rows(items.iter().map(|s| s.field_features.as_slice()).collect(), device);
        let storage = stack_rows(
            items.iter().map(|s| s.storage_features.as_slice()).collect(),
            device,
        );

        let shi_data: Vec<f32> = items.iter().map(|s| s.shi).collect();
        let ars_data: Vec<f32> = items.iter().map(|s| s.ars).collect();
        let shi = Tensor::<B, 2>::from_floats(TensorData::new(shi_data, [batch_size, 1]), device);
        let ars = Tensor::<B, 2>::from_floats(TensorData::new(ars_data, [batch_size, 1]), device);

        SeedBatch {
            spectra,
            uav,
            environment,
            field,
            storage,
            shi,
            ars,
        }
    }
}
