use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use image::{imageops, Rgb, RgbImage};

use aligner_core::levels::DisplayRange;
use aligner_core::overlay::AlphaMode;
use aligner_core::scheduler::RenderQuality;

use super::{open_session, StackArgs};

#[derive(Clone, Copy, ValueEnum)]
pub enum AlphaModeArg {
    Constant,
    Intensity,
}

#[derive(Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Active (overlaid) channel, 1-based
    #[arg(long, default_value = "2")]
    pub active: usize,

    /// Canvas width in pixels
    #[arg(long, default_value = "1024")]
    pub width: usize,

    /// Canvas height in pixels
    #[arg(long, default_value = "768")]
    pub height: usize,

    /// Zoom relative to fit-to-canvas
    #[arg(long, default_value = "1.0")]
    pub zoom: f64,

    /// Horizontal and vertical scroll position as fractions of the content
    #[arg(long, num_args = 2, value_names = ["FX", "FY"])]
    pub scroll: Option<Vec<f64>>,

    /// Overlay opacity
    #[arg(long)]
    pub opacity: Option<f64>,

    /// Overlay alpha mode
    #[arg(long, value_enum)]
    pub alpha_mode: Option<AlphaModeArg>,

    /// Brightness multiplier
    #[arg(long)]
    pub brightness: Option<f64>,

    /// Manual display range as MIN MAX (auto levels otherwise)
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
    pub levels: Option<Vec<f32>>,

    /// Render straight from full-resolution channels
    #[arg(long)]
    pub full_res: bool,

    /// Render the nearest-neighbour draft instead of the settled view
    #[arg(long)]
    pub draft: bool,

    /// Output PNG
    #[arg(short, long, default_value = "preview.png")]
    pub output: PathBuf,
}

pub fn run(args: &PreviewArgs) -> Result<()> {
    let mut session = open_session(&args.stack)?;
    let total = session.channel_count();
    if args.active == 0 || args.active > total {
        bail!("Active channel {} out of range (stack has {total} channels)", args.active);
    }
    session.set_active(args.active - 1)?;

    if let Some(opacity) = args.opacity {
        session.set_opacity(opacity);
    }
    if let Some(mode) = args.alpha_mode {
        session.set_alpha_mode(match mode {
            AlphaModeArg::Constant => AlphaMode::Constant,
            AlphaModeArg::Intensity => AlphaMode::Intensity,
        });
    }
    if let Some(brightness) = args.brightness {
        session.set_brightness(brightness);
    }
    if let Some(levels) = &args.levels {
        let range = DisplayRange::validated(levels[0], levels[1])?;
        session.set_display_range(range.min, range.max);
        session.set_auto_levels(false);
    }
    session.set_full_resolution(args.full_res);
    session.set_canvas_size(args.width, args.height);
    session.set_zoom(args.zoom);

    // First render resolves the layout so stored fractions can be clamped.
    let quality = if args.draft {
        RenderQuality::Draft
    } else {
        RenderQuality::Final
    };
    let mut view = session.render(quality)?;
    if let Some(scroll) = &args.scroll {
        session.set_scroll_fractions(scroll[0], scroll[1]);
        view = session.render(quality)?;
    }
    let Some(view) = view else {
        bail!("Nothing to render");
    };

    let (cw, ch) = session.canvas_size();
    let mut canvas = RgbImage::from_pixel(cw as u32, ch as u32, Rgb([17, 17, 17]));
    if let Some(image) = &view.image {
        let (ox, oy) = view.layout.origin(view.fractions.0, view.fractions.1);
        imageops::overlay(
            &mut canvas,
            image,
            view.pos_x - ox as i64,
            view.pos_y - oy as i64,
        );
    }
    canvas
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("{}", session.status_line());
    println!("Preview saved to {}", args.output.display());
    Ok(())
}
