use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{UVec2, Vec2};
use sha2::{Digest, Sha256};
use tilegrid_common::{BufferAllocator, TextureHandle, TilemapData, TilemapMeta};
use tilegrid_render::{
    AutoTileLayout, DebugRenderer, FramePlan, HostTexture, OrthoCamera, RenderConfig, RenderPass,
    Renderer, SPRITE_PUSH_SIZE, SpriteInstanceSet, SpriteSheet, TILE_STRIDE, TILEMAP_HEADER_SIZE,
    TRANSFORMS_SIZE, TileBuffer, TileGrid, TransformState,
};
use tilegrid_render_wgpu::{
    OFFSCREEN_FORMAT, OffscreenTarget, WgpuTileRenderer, request_headless_device,
};
use tracing_subscriber::EnvFilter;

/// Demo sheet: 8x8 cells of 8x8 texels.
const SHEET_CELLS: u32 = 8;
const CELL_TEXELS: u32 = 8;
const DEMO_GRID: u32 = 16;

#[derive(Parser)]
#[command(name = "tilegrid-cli", about = "CLI tool for tilegrid tilemaps")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and GPU layout sizes
    Info,
    /// Pack a JSON tilemap into its GPU byte layout
    Pack {
        /// Tilemap JSON file
        #[arg(short, long)]
        map: PathBuf,
        /// Write the packed bytes here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Build a frame and print what the CPU renderer draws
    Frame {
        /// Tilemap JSON file; the demo grid is used when absent
        #[arg(short, long)]
        map: Option<PathBuf>,
        /// Side length of the square demo grid
        #[arg(short, long, default_value = "16")]
        grid: u32,
        /// Number of demo sprites
        #[arg(short, long, default_value = "2")]
        sprites: u32,
    },
    /// Render a frame offscreen with wgpu and hash the pixels
    Render {
        #[arg(long, default_value = "256")]
        width: u32,
        #[arg(long, default_value = "256")]
        height: u32,
        /// Tilemap JSON file; the demo grid is used when absent
        #[arg(short, long)]
        map: Option<PathBuf>,
        /// RenderConfig JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of demo sprites
        #[arg(short, long, default_value = "2")]
        sprites: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("tilegrid-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("transforms uniform: {TRANSFORMS_SIZE} bytes");
            println!("tilemap header: {TILEMAP_HEADER_SIZE} bytes, tile stride: {TILE_STRIDE} bytes");
            println!("sprite push constants: {SPRITE_PUSH_SIZE} bytes");
        }
        Commands::Pack { map, out } => {
            let data = load_map(&map)?;
            let buffer = TileBuffer::from_data(&data)?;
            let bytes = buffer.to_bytes();
            println!(
                "Packed {} tiles: {} bytes, sha256={:x}",
                buffer.len(),
                bytes.len(),
                Sha256::digest(&bytes)
            );
            if let Some(out) = out {
                std::fs::write(&out, &bytes)
                    .with_context(|| format!("writing {}", out.display()))?;
                println!("Wrote {}", out.display());
            }
        }
        Commands::Frame { map, grid, sprites } => {
            let mut tiles = match map {
                Some(path) => TileBuffer::from_data(&load_map(&path)?)?,
                None => demo_tiles(grid)?,
            };
            let mut renderer = DebugRenderer::new();
            let sheet = renderer.add_texture(HostTexture::from_fn(
                SHEET_CELLS * CELL_TEXELS,
                SHEET_CELLS * CELL_TEXELS,
                sheet_texel,
            )?);
            let viewport = UVec2::new(800, 600);
            let plan = build_frame(&mut renderer, &mut tiles, sheet, sprites, viewport)?;
            let report = renderer.render(&plan)?;
            print!("{report}");
        }
        Commands::Render {
            width,
            height,
            map,
            config,
            sprites,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => RenderConfig::default(),
            };
            let mut tiles = match map {
                Some(path) => TileBuffer::from_data(&load_map(&path)?)?,
                None => demo_tiles(DEMO_GRID)?,
            };

            let (device, queue) = request_headless_device(config.sprite_mode)?;
            let mut renderer = WgpuTileRenderer::new(device, queue, OFFSCREEN_FORMAT, config)?;
            println!("Sprite path: {:?}", renderer.sprite_path());

            let side = SHEET_CELLS * CELL_TEXELS;
            let sheet_pixels = HostTexture::from_fn(side, side, sheet_texel)?;
            let sheet = renderer.create_sheet_texture(side, side, sheet_pixels.rgba())?;

            let viewport = UVec2::new(width, height);
            let plan = build_frame(&mut renderer, &mut tiles, sheet, sprites, viewport)?;
            let target = OffscreenTarget::new(renderer.device(), width, height)?;
            let stats = renderer.render_to(target.view(), &plan)?;
            let pixels = target.read_pixels(renderer.device(), renderer.queue())?;

            println!(
                "Frame: draw_calls={}, tiles={}, sprites={}",
                stats.draw_calls, stats.tile_instances, stats.sprites
            );
            println!(
                "Pixels: {width}x{height}, sha256={:x}",
                Sha256::digest(&pixels)
            );
        }
    }

    Ok(())
}

fn load_map(path: &Path) -> anyhow::Result<TilemapData> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_config(path: &Path) -> anyhow::Result<RenderConfig> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Distinct flat colour per sheet cell, with a dark one-texel border.
fn sheet_texel(x: u32, y: u32) -> [u8; 4] {
    let (cx, cy) = (x / CELL_TEXELS, y / CELL_TEXELS);
    if x % CELL_TEXELS == 0 || y % CELL_TEXELS == 0 {
        return [16, 16, 24, 255];
    }
    let step = 255 / SHEET_CELLS;
    [(cx * step) as u8, (cy * step) as u8, 160, 255]
}

/// A square grid with a border and both diagonals filled, auto-tiled from the
/// block at the sheet's top-left corner.
fn demo_tiles(side: u32) -> anyhow::Result<TileBuffer> {
    let mut grid = TileGrid::new(side, side)?;
    let last = side - 1;
    for i in 0..side {
        for (x, y) in [(i, 0), (i, last), (0, i), (last, i), (i, i), (last - i, i)] {
            grid.set(x, y, 0)?;
        }
    }
    let layout = AutoTileLayout::new(UVec2::ZERO, SHEET_CELLS)?;
    let tile_size = Vec2::splat(1.0 / SHEET_CELLS as f32);
    let mut tiles = TileBuffer::new(TilemapMeta::new(tile_size, side, SHEET_CELLS)?);
    tiles.sync_autotiled(&grid, tile_size, &layout)?;
    tracing::info!(side, filled = grid.filled_count(), "demo grid built");
    Ok(tiles)
}

/// Upload the map and camera, then record the tilemap and demo sprites.
fn build_frame<A: BufferAllocator>(
    alloc: &mut A,
    tiles: &mut TileBuffer,
    sheet: TextureHandle,
    sprites: u32,
    viewport: UVec2,
) -> anyhow::Result<FramePlan> {
    let meta = *tiles.meta();
    let rows = tiles
        .tiles()
        .iter()
        .map(|t| meta.grid_coords(*t).y + 1)
        .max()
        .unwrap_or(1);
    let mut camera = OrthoCamera::framing(meta.grid_width(), rows);
    camera.set_viewport(viewport);

    let mut transforms = TransformState::new();
    camera.apply_to(&mut transforms);
    transforms.upload(alloc)?;
    tiles.upload(alloc)?;

    let mut pass = RenderPass::begin(&transforms)?;
    pass.draw_all_tiles(tiles, sheet)?;

    let sprite_sheet = SpriteSheet::new(SHEET_CELLS, SHEET_CELLS, CELL_TEXELS, CELL_TEXELS)?;
    let mut set = SpriteInstanceSet::new();
    for i in 0..sprites {
        let offset = i as f32 * 1.5;
        set.add_from_sheet(
            &sprite_sheet,
            Vec2::new(offset, offset),
            UVec2::new(i % SHEET_CELLS, SHEET_CELLS - 1),
        )?;
    }
    set.flush(sheet, &mut pass);
    Ok(pass.finish())
}
