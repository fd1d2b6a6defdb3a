//! Two-node axial truss element.
//!
//! One translational degree of freedom per node along the member axis:
//!
//! - strain ε = (u₂ - u₁) / L
//! - tangent stiffness K = (A·Eₜ / L) · [[1, -1], [-1, 1]]
//! - resisting force  f = σ·A · [-1, 1]
//!
//! The element owns an independent copy of its material.

use crate::broker::{recv_class_tag, send_class_tag, ObjectBroker};
use crate::channel::{Channel, Movable};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::material::{LinearElastic, UniaxialMaterial};
use crate::parameter::{finite, ParameterId, Parameterized};
use crate::response::{Information, Response, ResponseId};
use crate::types::{ClassTag, EqnNumber, Tag};
use nalgebra::{DMatrix, DVector};
use std::fmt;

const AXIAL_FORCE: ResponseId = ResponseId(1);
const MATERIAL_OFFSET: u32 = 100;

/// Two-node axial element.
#[derive(Debug)]
pub struct Truss {
    tag: Tag,
    equation_numbers: [EqnNumber; 2],
    length: f64,
    area: f64,
    material: Box<dyn UniaxialMaterial>,
}

impl Truss {
    /// Create a truss element.
    ///
    /// # Arguments
    ///
    /// * `tag` - Unique element tag
    /// * `equation_numbers` - Global equations of the two end nodes
    /// * `length` - Member length
    /// * `area` - Cross-sectional area
    /// * `material` - Material law; the element keeps its own copy
    ///
    /// # Errors
    ///
    /// Returns error if length or area is not positive and finite.
    pub fn new(
        tag: Tag,
        equation_numbers: [EqnNumber; 2],
        length: f64,
        area: f64,
        material: &dyn UniaxialMaterial,
    ) -> Result<Self> {
        if !(length.is_finite() && length > 0.0) {
            return Err(Error::Config(format!(
                "truss {tag}: length must be positive, got {length}"
            )));
        }
        if !(area.is_finite() && area > 0.0) {
            return Err(Error::Config(format!(
                "truss {tag}: area must be positive, got {area}"
            )));
        }
        Ok(Self {
            tag,
            equation_numbers,
            length,
            area,
            material: material.get_copy(),
        })
    }

    /// Receivable instance.
    pub fn blank() -> Self {
        Self {
            tag: 0,
            equation_numbers: [-1, -1],
            length: 1.0,
            area: 1.0,
            material: Box::new(LinearElastic::blank()),
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn material(&self) -> &dyn UniaxialMaterial {
        self.material.as_ref()
    }

    /// Axial force at the trial state.
    pub fn axial_force(&self) -> f64 {
        self.area * self.material.stress()
    }
}

impl Element for Truss {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn equation_numbers(&self) -> &[EqnNumber] {
        &self.equation_numbers
    }

    fn set_trial_displacements(&mut self, displacements: &[f64]) -> Result<()> {
        if displacements.len() != 2 {
            return Err(Error::Assembly(format!(
                "truss {} expects 2 displacements, got {}",
                self.tag,
                displacements.len()
            )));
        }
        let strain = (displacements[1] - displacements[0]) / self.length;
        self.material.set_trial_strain(strain, 0.0)
    }

    fn tangent_stiffness(&self) -> DMatrix<f64> {
        let k = self.area * self.material.tangent() / self.length;
        DMatrix::from_row_slice(2, 2, &[k, -k, -k, k])
    }

    fn resisting_force(&self) -> DVector<f64> {
        let n = self.axial_force();
        DVector::from_vec(vec![-n, n])
    }

    fn commit_state(&mut self) -> Result<()> {
        self.material.commit_state()
    }

    fn revert_to_last_commit(&mut self) -> Result<()> {
        self.material.revert_to_last_commit()
    }

    fn revert_to_start(&mut self) -> Result<()> {
        self.material.revert_to_start()
    }

    fn get_copy(&self) -> Box<dyn Element> {
        Box::new(Self {
            tag: self.tag,
            equation_numbers: self.equation_numbers,
            length: self.length,
            area: self.area,
            material: self.material.get_copy(),
        })
    }

    /// `axialForce`, or `material ...` forwarded to the material.
    fn set_response(&self, args: &[&str]) -> Option<Response> {
        match args.first().copied()? {
            "axialForce" | "force" => Some(Response::new(
                AXIAL_FORCE,
                Information::Double(self.axial_force()),
            )),
            "material" => {
                let inner = self.material.set_response(&args[1..])?;
                Some(Response::new(
                    ResponseId(inner.id().0 + MATERIAL_OFFSET),
                    inner.info().clone(),
                ))
            }
            _ => None,
        }
    }

    fn get_response(&self, response: &mut Response) -> Result<()> {
        let id = response.id();
        if id == AXIAL_FORCE {
            return response.set(Information::Double(self.axial_force()));
        }
        if id.0 > MATERIAL_OFFSET {
            let mut inner = Response::new(ResponseId(id.0 - MATERIAL_OFFSET), response.info().clone());
            self.material.get_response(&mut inner)?;
            return response.set(inner.info().clone());
        }
        Err(Error::Parameter(format!(
            "truss {} has no response {:?}",
            self.tag, id
        )))
    }
}

impl Parameterized for Truss {
    /// `A`, or `material ...` forwarded to the material.
    fn set_parameter(&self, args: &[&str]) -> Result<ParameterId> {
        match args.first().copied() {
            Some("A") => Ok(ParameterId::Area),
            Some("material") => self.material.set_parameter(&args[1..]),
            other => Err(Error::Parameter(format!(
                "truss {} has no parameter {:?}",
                self.tag, other
            ))),
        }
    }

    fn update_parameter(&mut self, id: ParameterId, value: f64) -> Result<()> {
        match id {
            ParameterId::Area => {
                let area = finite(id, value)?;
                if area <= 0.0 {
                    return Err(Error::Parameter(format!(
                        "truss {}: area must be positive, got {area}",
                        self.tag
                    )));
                }
                self.area = area;
                Ok(())
            }
            other => self.material.update_parameter(other, value),
        }
    }
}

impl Movable for Truss {
    fn class_tag(&self) -> ClassTag {
        ClassTag::Truss
    }

    /// Message sequence: id `[tag, eqn_1, eqn_2]`, vector `[length, area]`,
    /// material class tag, then the material itself.
    fn send_self(&self, commit_tag: i32, channel: &mut dyn Channel) -> Result<()> {
        let db_tag = self.db_tag();
        channel.send_id(
            db_tag,
            commit_tag,
            &[self.tag, self.equation_numbers[0], self.equation_numbers[1]],
        )?;
        channel.send_vector(db_tag, commit_tag, &[self.length, self.area])?;
        send_class_tag(self.material.as_ref(), db_tag, commit_tag, channel)?;
        self.material.send_self(commit_tag, channel)
    }

    fn recv_self(
        &mut self,
        commit_tag: i32,
        channel: &mut dyn Channel,
        broker: &dyn ObjectBroker,
    ) -> Result<()> {
        let db_tag = self.db_tag();
        let mut ids = [0i32; 3];
        let mut data = [0.0; 2];
        channel.recv_id(db_tag, commit_tag, &mut ids)?;
        channel.recv_vector(db_tag, commit_tag, &mut data)?;

        let material_tag = recv_class_tag(db_tag, commit_tag, channel)?;
        let mut material = broker.new_material(material_tag)?;
        material.recv_self(commit_tag, channel, broker)?;

        if !(data[0] > 0.0 && data[1] > 0.0) {
            return Err(Error::Channel(format!(
                "received invalid truss geometry: length {} area {}",
                data[0], data[1]
            )));
        }

        self.tag = ids[0];
        self.equation_numbers = [ids[1], ids[2]];
        self.length = data[0];
        self.area = data[1];
        self.material = material;
        Ok(())
    }
}

impl fmt::Display for Truss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Truss tag: {}", self.tag)?;
        writeln!(
            f,
            "  equations: {:?} length: {} area: {}",
            self.equation_numbers, self.length, self.area
        )?;
        writeln!(f, "  axial force: {}", self.axial_force())?;
        write!(f, "{}", self.material)
    }
}
